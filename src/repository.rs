//! 记录持久化接口

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

use crate::error::Fault;

/// 一条人员记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonRecord {
    pub id: u64,
    pub name: String,
    pub age: i32,
}

/// 记录仓储接口
pub trait RecordMapper: Send + Sync {
    /// 插入一条记录，返回受影响的行数
    fn insert_record(&self, name: &str, age: i32) -> Result<u64, Fault>;
}

/// 内存实现，供演示与测试使用
#[derive(Debug, Default)]
pub struct InMemoryRecordMapper {
    records: DashMap<u64, PersonRecord>,
    next_id: AtomicU64,
}

impl InMemoryRecordMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, id: u64) -> Option<PersonRecord> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    /// 按 id 排序的全部记录
    pub fn records(&self) -> Vec<PersonRecord> {
        let mut records: Vec<_> = self.records.iter().map(|entry| entry.value().clone()).collect();
        records.sort_by_key(|record| record.id);
        records
    }
}

impl RecordMapper for InMemoryRecordMapper {
    fn insert_record(&self, name: &str, age: i32) -> Result<u64, Fault> {
        if name.trim().is_empty() {
            return Err(Fault::InvalidArgument("name must not be empty".to_string()));
        }
        if age < 0 {
            return Err(Fault::InvalidArgument(format!("age must not be negative, got {age}")));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.records.insert(
            id,
            PersonRecord {
                id,
                name: name.to_string(),
                age,
            },
        );
        tracing::debug!(id, name = %name, age, "record inserted");
        Ok(1)
    }
}
