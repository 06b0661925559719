use std::fmt;
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use once_cell::sync::OnceCell;

use crate::error::{AopError, Result};

use super::selector::Selector;
use super::types::{
    AdviceKind, AdviceMetadata, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice,
    AroundAdvice, BeforeAdvice, FaultType, OperationSignature, SignatureShape, ValueType,
};

/// 按通知类型区分的回调
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    Around(Arc<dyn AroundAdvice>),
    AfterReturning {
        returning: ValueType,
        handler: Arc<dyn AfterReturningAdvice>,
    },
    AfterThrowing {
        throwing: FaultType,
        handler: Arc<dyn AfterThrowingAdvice>,
    },
    After(Arc<dyn AfterAdvice>),
}

impl Advice {
    pub fn kind(&self) -> AdviceKind {
        match self {
            Advice::Before(_) => AdviceKind::Before,
            Advice::Around(_) => AdviceKind::Around,
            Advice::AfterReturning { .. } => AdviceKind::AfterReturning,
            Advice::AfterThrowing { .. } => AdviceKind::AfterThrowing,
            Advice::After(_) => AdviceKind::After,
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::AfterReturning { returning, .. } => {
                write!(f, "AfterReturning({returning})")
            }
            Advice::AfterThrowing { throwing, .. } => write!(f, "AfterThrowing({throwing:?})"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// 注册表中的一条通知
#[derive(Debug, Clone)]
pub struct AdviceEntry {
    metadata: AdviceMetadata,
    selector: Arc<Selector>,
    advice: Advice,
}

impl AdviceEntry {
    pub fn new(metadata: AdviceMetadata, selector: Arc<Selector>, advice: Advice) -> Self {
        Self {
            metadata: metadata.with_kind(advice.kind()),
            selector,
            advice,
        }
    }

    pub fn metadata(&self) -> &AdviceMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn kind(&self) -> AdviceKind {
        self.advice.kind()
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn advice(&self) -> &Advice {
        &self.advice
    }

    pub fn matches(&self, signature: &OperationSignature) -> bool {
        self.selector.matches(signature)
    }
}

/// 通知注册表，构建完成后只读
pub struct AdviceRegistry {
    entries: Vec<AdviceEntry>,
    match_cache: Option<DashMap<SignatureShape, Arc<[usize]>>>,
    around_conflicts: DashSet<SignatureShape>,
}

impl AdviceRegistry {
    pub fn builder() -> AdviceRegistryBuilder {
        AdviceRegistryBuilder::default()
    }

    pub fn empty() -> Arc<Self> {
        AdviceRegistryBuilder::default().build()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按注册顺序返回全部通知
    pub fn entries(&self) -> &[AdviceEntry] {
        &self.entries
    }

    /// 匹配签名的指定类型通知，保持注册顺序
    pub fn lookup(&self, signature: &OperationSignature, kind: AdviceKind) -> Vec<&AdviceEntry> {
        self.plan(signature).of_kind(kind).collect()
    }

    /// 匹配签名的全部通知
    pub fn plan(&self, signature: &OperationSignature) -> AdvicePlan<'_> {
        let indices = self.matching_indices(signature);
        AdvicePlan {
            entries: indices.iter().map(|&idx| &self.entries[idx]).collect(),
        }
    }

    fn matching_indices(&self, signature: &OperationSignature) -> Arc<[usize]> {
        let Some(cache) = &self.match_cache else {
            return self.scan(signature);
        };
        let shape = signature.shape();
        if let Some(hit) = cache.get(&shape) {
            return Arc::clone(hit.value());
        }
        let indices = self.scan(signature);
        cache.insert(shape, Arc::clone(&indices));
        indices
    }

    /// 记录多个 Around 同时匹配的签名形状，首次出现时返回 `true`
    pub(crate) fn first_around_conflict(&self, signature: &OperationSignature) -> bool {
        self.around_conflicts.insert(signature.shape())
    }

    fn scan(&self, signature: &OperationSignature) -> Arc<[usize]> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.matches(signature))
            .map(|(idx, _)| idx)
            .collect()
    }

    #[cfg(test)]
    fn cached_shapes(&self) -> usize {
        self.match_cache.as_ref().map(DashMap::len).unwrap_or(0)
    }
}

impl fmt::Debug for AdviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdviceRegistry")
            .field("entries", &self.entries)
            .field("match_cache", &self.match_cache.is_some())
            .finish()
    }
}

/// 单次调用匹配到的通知执行计划
pub struct AdvicePlan<'r> {
    entries: Vec<&'r AdviceEntry>,
}

impl<'r> AdvicePlan<'r> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn of_kind(&self, kind: AdviceKind) -> impl Iterator<Item = &'r AdviceEntry> + '_ {
        self.entries
            .iter()
            .copied()
            .filter(move |entry| entry.kind() == kind)
    }

    pub fn before(&self) -> impl Iterator<Item = (&'r AdviceEntry, &'r dyn BeforeAdvice)> + '_ {
        self.entries.iter().copied().filter_map(|entry| match &entry.advice {
            Advice::Before(handler) => Some((entry, handler.as_ref())),
            _ => None,
        })
    }

    pub fn around(&self) -> impl Iterator<Item = (&'r AdviceEntry, &'r dyn AroundAdvice)> + '_ {
        self.entries.iter().copied().filter_map(|entry| match &entry.advice {
            Advice::Around(handler) => Some((entry, handler.as_ref())),
            _ => None,
        })
    }

    pub fn after_returning(
        &self,
    ) -> impl Iterator<Item = (&'r AdviceEntry, ValueType, &'r dyn AfterReturningAdvice)> + '_
    {
        self.entries.iter().copied().filter_map(|entry| match &entry.advice {
            Advice::AfterReturning { returning, handler } => {
                Some((entry, *returning, handler.as_ref()))
            }
            _ => None,
        })
    }

    pub fn after_throwing(
        &self,
    ) -> impl Iterator<Item = (&'r AdviceEntry, FaultType, &'r dyn AfterThrowingAdvice)> + '_
    {
        self.entries.iter().copied().filter_map(|entry| match &entry.advice {
            Advice::AfterThrowing { throwing, handler } => {
                Some((entry, *throwing, handler.as_ref()))
            }
            _ => None,
        })
    }

    pub fn after(&self) -> impl Iterator<Item = (&'r AdviceEntry, &'r dyn AfterAdvice)> + '_ {
        self.entries.iter().copied().filter_map(|entry| match &entry.advice {
            Advice::After(handler) => Some((entry, handler.as_ref())),
            _ => None,
        })
    }
}

/// 通知注册构建器，`build` 之后注册即关闭
pub struct AdviceRegistryBuilder {
    entries: Vec<AdviceEntry>,
    match_cache: bool,
}

impl Default for AdviceRegistryBuilder {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            match_cache: true,
        }
    }
}

impl AdviceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否按签名缓存匹配结果
    pub fn with_match_cache(mut self, enabled: bool) -> Self {
        self.match_cache = enabled;
        self
    }

    pub fn register(&mut self, entry: AdviceEntry) -> &mut Self {
        tracing::debug!(
            advice = %entry.name(),
            kind = %entry.kind(),
            selector = %entry.selector(),
            "advice registered"
        );
        self.entries.push(entry);
        self
    }

    pub fn before<A>(
        &mut self,
        metadata: AdviceMetadata,
        selector: Arc<Selector>,
        advice: A,
    ) -> &mut Self
    where
        A: BeforeAdvice + 'static,
    {
        self.register(AdviceEntry::new(
            metadata,
            selector,
            Advice::Before(Arc::new(advice)),
        ))
    }

    pub fn around<A>(
        &mut self,
        metadata: AdviceMetadata,
        selector: Arc<Selector>,
        advice: A,
    ) -> &mut Self
    where
        A: AroundAdvice + 'static,
    {
        self.register(AdviceEntry::new(
            metadata,
            selector,
            Advice::Around(Arc::new(advice)),
        ))
    }

    pub fn after_returning<A>(
        &mut self,
        metadata: AdviceMetadata,
        selector: Arc<Selector>,
        returning: ValueType,
        advice: A,
    ) -> &mut Self
    where
        A: AfterReturningAdvice + 'static,
    {
        self.register(AdviceEntry::new(
            metadata,
            selector,
            Advice::AfterReturning {
                returning,
                handler: Arc::new(advice),
            },
        ))
    }

    pub fn after_throwing<A>(
        &mut self,
        metadata: AdviceMetadata,
        selector: Arc<Selector>,
        throwing: FaultType,
        advice: A,
    ) -> &mut Self
    where
        A: AfterThrowingAdvice + 'static,
    {
        self.register(AdviceEntry::new(
            metadata,
            selector,
            Advice::AfterThrowing {
                throwing,
                handler: Arc::new(advice),
            },
        ))
    }

    pub fn after<A>(&mut self, metadata: AdviceMetadata, selector: Arc<Selector>, advice: A) -> &mut Self
    where
        A: AfterAdvice + 'static,
    {
        self.register(AdviceEntry::new(
            metadata,
            selector,
            Advice::After(Arc::new(advice)),
        ))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Arc<AdviceRegistry> {
        tracing::info!(
            entries = self.entries.len(),
            match_cache = self.match_cache,
            "advice registry sealed"
        );
        Arc::new(AdviceRegistry {
            entries: self.entries,
            match_cache: self.match_cache.then(DashMap::new),
            around_conflicts: DashSet::new(),
        })
    }
}

static GLOBAL_REGISTRY: OnceCell<Arc<AdviceRegistry>> = OnceCell::new();

/// 进程级通知注册表
pub struct GlobalAdviceRegistry;

impl GlobalAdviceRegistry {
    /// 安装进程级注册表，只能安装一次
    pub fn init(registry: Arc<AdviceRegistry>) -> Result<Arc<AdviceRegistry>> {
        GLOBAL_REGISTRY
            .set(Arc::clone(&registry))
            .map_err(|_| AopError::Config("global advice registry already installed".to_string()))?;
        Ok(registry)
    }

    /// 已安装的进程级注册表
    pub fn get() -> Option<Arc<AdviceRegistry>> {
        GLOBAL_REGISTRY.get().cloned()
    }
}
