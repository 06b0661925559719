use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use crate::error::{AopError, Result};

use super::types::OperationSignature;

/// 名称匹配规则，`*` 匹配段内任意字符（如 `get*`）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern(String);

impl NamePattern {
    pub fn new<T: Into<String>>(pattern: T) -> Self {
        NamePattern(pattern.into())
    }

    pub fn is_any(&self) -> bool {
        self.0 == "*"
    }

    pub fn matches(&self, value: &str) -> bool {
        self.is_any() || glob_match(&self.0, value)
    }
}

impl fmt::Display for NamePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.as_bytes();
    let text = text.as_bytes();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            backtrack = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star, mark)) = backtrack {
            p = star + 1;
            t = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Name(NamePattern),
    /// `..`：零个或多个包段
    AnyPath,
}

/// 声明类型匹配规则：以 `.` 分隔的段，支持 `*`、`..` 与结尾的 `+`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePattern {
    segments: Vec<Segment>,
    include_subtypes: bool,
}

impl TypePattern {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        let (raw, include_subtypes) = match raw.strip_suffix('+') {
            Some(stripped) => (stripped, true),
            None => (raw, false),
        };
        if raw.is_empty() {
            return Err("missing declaring type".to_string());
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part.is_empty() {
                if segments.last() != Some(&Segment::AnyPath) {
                    segments.push(Segment::AnyPath);
                }
            } else if part
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '*')
            {
                segments.push(Segment::Name(NamePattern::new(part)));
            } else {
                return Err(format!("invalid type segment `{part}`"));
            }
        }

        Ok(Self {
            segments,
            include_subtypes,
        })
    }

    pub fn matches(&self, signature: &OperationSignature) -> bool {
        if self.matches_type(&signature.declaring_type) {
            return true;
        }
        self.include_subtypes
            && signature
                .supertypes
                .iter()
                .any(|supertype| self.matches_type(supertype))
    }

    fn matches_type(&self, type_name: &str) -> bool {
        let parts: Vec<&str> = type_name.split('.').collect();
        if match_segments(&self.segments, &parts) {
            return true;
        }
        // 开头的 `*..` 同样匹配默认包中的类型
        match self.segments.as_slice() {
            [Segment::Name(first), rest @ ..]
                if first.is_any() && rest.first() == Some(&Segment::AnyPath) =>
            {
                match_segments(rest, &parts)
            }
            _ => false,
        }
    }
}

fn match_segments(pattern: &[Segment], parts: &[&str]) -> bool {
    match pattern.split_first() {
        None => parts.is_empty(),
        Some((Segment::AnyPath, rest)) => {
            (0..=parts.len()).any(|skip| match_segments(rest, &parts[skip..]))
        }
        Some((Segment::Name(name), rest)) => match parts.split_first() {
            Some((head, tail)) => name.matches(head) && match_segments(rest, tail),
            None => false,
        },
    }
}

impl fmt::Display for TypePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut previous_was_name = false;
        for segment in &self.segments {
            match segment {
                Segment::Name(name) => {
                    if previous_was_name {
                        f.write_str(".")?;
                    }
                    write!(f, "{name}")?;
                    previous_was_name = true;
                }
                Segment::AnyPath => {
                    f.write_str("..")?;
                    previous_was_name = false;
                }
            }
        }
        if self.include_subtypes {
            f.write_str("+")?;
        }
        Ok(())
    }
}

/// 参数列表匹配规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgsPattern {
    /// 恰好 n 个参数（`()`、`(*)`、`(*,*)`）
    Exact(usize),
    /// 至少 n 个参数（`(..)`、`(*,..)`）
    AtLeast(usize),
}

impl ArgsPattern {
    /// 参数类型不在签名模型中，具名参数类型按单个参数位计数
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(ArgsPattern::Exact(0));
        }
        let tokens: Vec<&str> = raw.split(',').map(str::trim).collect();
        if tokens.iter().any(|token| token.is_empty()) {
            return Err("empty parameter pattern".to_string());
        }
        let fixed = tokens.iter().filter(|token| **token != "..").count();
        if fixed == tokens.len() {
            Ok(ArgsPattern::Exact(fixed))
        } else {
            Ok(ArgsPattern::AtLeast(fixed))
        }
    }

    pub fn matches(&self, arity: usize) -> bool {
        match *self {
            ArgsPattern::Exact(n) => arity == n,
            ArgsPattern::AtLeast(n) => arity >= n,
        }
    }
}

impl fmt::Display for ArgsPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (fixed, open) = match *self {
            ArgsPattern::Exact(n) => (n, false),
            ArgsPattern::AtLeast(n) => (n, true),
        };
        let mut tokens = vec!["*"; fixed];
        if open {
            tokens.push("..");
        }
        f.write_str(&tokens.join(","))
    }
}

/// `execution(...)` 形式的方法执行匹配规则
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPattern {
    pub return_type: NamePattern,
    pub declaring_type: TypePattern,
    pub method: NamePattern,
    pub args: ArgsPattern,
}

impl ExecutionPattern {
    /// 解析 `[返回类型] 类型.方法(参数)`，返回类型省略时视为 `*`
    pub fn parse(body: &str) -> std::result::Result<Self, String> {
        let body = body.trim();
        let open = body
            .find('(')
            .ok_or_else(|| "missing parameter list".to_string())?;
        if !body.ends_with(')') {
            return Err("parameter list must close the pattern".to_string());
        }
        let params = &body[open + 1..body.len() - 1];
        let head = body[..open].trim();

        let mut words = head.split_whitespace();
        let (return_type, qualified) = match (words.next(), words.next(), words.next()) {
            (Some(qualified), None, None) => ("*", qualified),
            (Some(return_type), Some(qualified), None) => (return_type, qualified),
            _ => return Err("expected `[return-type] type.method`".to_string()),
        };

        let dot = qualified
            .rfind('.')
            .ok_or_else(|| "expected `type.method`".to_string())?;
        let (type_part, method_part) = (&qualified[..dot], &qualified[dot + 1..]);
        if method_part.is_empty() {
            return Err("missing method name".to_string());
        }

        Ok(Self {
            return_type: NamePattern::new(return_type),
            declaring_type: TypePattern::parse(type_part)?,
            method: NamePattern::new(method_part),
            args: ArgsPattern::parse(params)?,
        })
    }

    pub fn matches(&self, signature: &OperationSignature) -> bool {
        self.matches_return_type(&signature.return_type)
            && self.method.matches(&signature.method)
            && self.args.matches(signature.arity())
            && self.declaring_type.matches(signature)
    }

    fn matches_return_type(&self, return_type: &str) -> bool {
        let simple = return_type.rsplit('.').next().unwrap_or(return_type);
        self.return_type.matches(return_type) || self.return_type.matches(simple)
    }
}

impl fmt::Display for ExecutionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "execution({} {}.{}({}))",
            self.return_type, self.declaring_type, self.method, self.args
        )
    }
}

/// 切点选择器：决定某个操作是否被拦截
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Execution(ExecutionPattern),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
    Not(Box<Selector>),
}

impl Selector {
    /// 解析切点表达式，如 `execution(* com.crosscut.controller.*.*(..)) && !execution(* *..*.health(..))`
    pub fn parse(expr: &str) -> Result<Self> {
        let mut parser = Parser { src: expr, pos: 0 };
        let selector = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos != expr.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(selector)
    }

    /// 指定包下任意类型的任意方法
    pub fn within_package(package: &str) -> Result<Self> {
        Self::parse(&format!("execution(* {package}.*.*(..))"))
    }

    pub fn and(self, other: Selector) -> Self {
        Selector::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Selector) -> Self {
        Selector::Or(Box::new(self), Box::new(other))
    }

    pub fn matches(&self, signature: &OperationSignature) -> bool {
        match self {
            Selector::Execution(pattern) => pattern.matches(signature),
            Selector::And(lhs, rhs) => lhs.matches(signature) && rhs.matches(signature),
            Selector::Or(lhs, rhs) => lhs.matches(signature) || rhs.matches(signature),
            Selector::Not(inner) => !inner.matches(signature),
        }
    }
}

impl Not for Selector {
    type Output = Selector;

    fn not(self) -> Self::Output {
        Selector::Not(Box::new(self))
    }
}

impl From<ExecutionPattern> for Selector {
    fn from(pattern: ExecutionPattern) -> Self {
        Selector::Execution(pattern)
    }
}

impl FromStr for Selector {
    type Err = AopError;

    fn from_str(s: &str) -> Result<Self> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Execution(pattern) => write!(f, "{pattern}"),
            Selector::And(lhs, rhs) => write!(f, "({lhs} && {rhs})"),
            Selector::Or(lhs, rhs) => write!(f, "({lhs} || {rhs})"),
            Selector::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error<T: Into<String>>(&self, reason: T) -> AopError {
        AopError::InvalidSelector {
            expr: self.src.to_string(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn parse_or(&mut self) -> Result<Selector> {
        let mut lhs = self.parse_and()?;
        while self.eat("||") {
            let rhs = self.parse_and()?;
            lhs = lhs.or(rhs);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Selector> {
        let mut lhs = self.parse_unary()?;
        while self.eat("&&") {
            let rhs = self.parse_unary()?;
            lhs = lhs.and(rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Selector> {
        if self.eat("!") {
            return Ok(!self.parse_unary()?);
        }
        if self.eat("(") {
            let inner = self.parse_or()?;
            if !self.eat(")") {
                return Err(self.error("expected `)`"));
            }
            return Ok(inner);
        }
        if self.eat("execution") {
            if !self.eat("(") {
                return Err(self.error("expected `(` after `execution`"));
            }
            return self.parse_execution_body();
        }
        Err(self.error("expected `execution(...)`, `!` or `(`"))
    }

    fn parse_execution_body(&mut self) -> Result<Selector> {
        let start = self.pos;
        let mut depth = 1usize;
        for (offset, ch) in self.rest().char_indices() {
            match ch {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = &self.src[start..start + offset];
                        let pattern = ExecutionPattern::parse(body).map_err(|reason| {
                            AopError::InvalidSelector {
                                expr: self.src.to_string(),
                                position: start,
                                reason,
                            }
                        })?;
                        self.pos = start + offset + 1;
                        return Ok(Selector::Execution(pattern));
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unterminated `execution(`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLERS: &str = "execution(* com.crosscut.controller.*.*(..))";

    fn sig(declaring_type: &str, method: &str, arity: usize) -> OperationSignature {
        let mut signature = OperationSignature::new(declaring_type, method);
        for i in 0..arity {
            signature = signature.with_arg(i as u64);
        }
        signature
    }

    #[test]
    fn package_wildcard_matches_direct_members_only() {
        let selector = Selector::parse(CONTROLLERS).unwrap();
        assert!(selector.matches(&sig("com.crosscut.controller.RecordController", "index", 0)));
        assert!(selector.matches(&sig("com.crosscut.controller.HtmlController", "show", 3)));
        assert!(!selector.matches(&sig("com.crosscut.controller.admin.UserController", "list", 0)));
        assert!(!selector.matches(&sig("com.crosscut.dao.RecordMapper", "insert", 2)));
    }

    #[test]
    fn multi_segment_wildcard_spans_packages() {
        let selector = Selector::parse("execution(* com.crosscut..*.*(..))").unwrap();
        assert!(selector.matches(&sig("com.crosscut.Root", "run", 0)));
        assert!(selector.matches(&sig("com.crosscut.controller.admin.UserController", "list", 0)));
        assert!(!selector.matches(&sig("org.other.Thing", "run", 0)));
    }

    #[test]
    fn leading_any_package_also_matches_the_default_package() {
        let selector = Selector::parse("execution(* *..*.health(..))").unwrap();
        assert!(selector.matches(&sig("HealthController", "health", 0)));
        assert!(selector.matches(&sig("a.b.HealthController", "health", 0)));
        assert!(!selector.matches(&sig("HealthController", "ping", 0)));

        let rooted = Selector::parse("execution(* com..*.health(..))").unwrap();
        assert!(!rooted.matches(&sig("HealthController", "health", 0)));
    }

    #[test]
    fn glob_inside_method_name() {
        let selector = Selector::parse("execution(* *..*.get*(..))").unwrap();
        assert!(selector.matches(&sig("a.B", "getName", 0)));
        assert!(selector.matches(&sig("a.B", "get", 0)));
        assert!(!selector.matches(&sig("a.B", "setName", 1)));
    }

    #[test]
    fn subtype_marker_consults_supertypes() {
        let selector = Selector::parse("execution(* com.crosscut.web.Handler+.*(..))").unwrap();
        let direct = sig("com.crosscut.web.Handler", "handle", 1);
        let subtype = sig("com.crosscut.controller.RecordController", "handle", 1)
            .with_supertypes(["com.crosscut.web.Handler"]);
        let unrelated = sig("com.crosscut.controller.RecordController", "handle", 1);
        assert!(selector.matches(&direct));
        assert!(selector.matches(&subtype));
        assert!(!selector.matches(&unrelated));

        let exact = Selector::parse("execution(* com.crosscut.web.Handler.*(..))").unwrap();
        assert!(!exact.matches(&subtype));
    }

    #[test]
    fn argument_shapes() {
        let none = Selector::parse("execution(* a.B.m())").unwrap();
        let two = Selector::parse("execution(* a.B.m(*, String))").unwrap();
        let at_least_one = Selector::parse("execution(* a.B.m(*, ..))").unwrap();
        assert!(none.matches(&sig("a.B", "m", 0)));
        assert!(!none.matches(&sig("a.B", "m", 1)));
        assert!(two.matches(&sig("a.B", "m", 2)));
        assert!(!two.matches(&sig("a.B", "m", 3)));
        assert!(!at_least_one.matches(&sig("a.B", "m", 0)));
        assert!(at_least_one.matches(&sig("a.B", "m", 4)));
    }

    #[test]
    fn return_type_pattern_accepts_simple_names() {
        let selector = Selector::parse("execution(String a.B.*(..))").unwrap();
        assert!(selector.matches(&sig("a.B", "m", 0).returning("java.lang.String")));
        assert!(selector.matches(&sig("a.B", "m", 0).returning("String")));
        assert!(!selector.matches(&sig("a.B", "m", 0).returning("Object")));
    }

    #[test]
    fn boolean_composition() {
        let selector = Selector::parse(
            "execution(* com.crosscut.controller.*.*(..)) && !(execution(* *..*.health(..)) || execution(* *..*.ping()))",
        )
        .unwrap();
        assert!(selector.matches(&sig("com.crosscut.controller.A", "index", 0)));
        assert!(!selector.matches(&sig("com.crosscut.controller.A", "health", 0)));
        assert!(!selector.matches(&sig("com.crosscut.controller.A", "ping", 0)));
        assert!(selector.matches(&sig("com.crosscut.controller.A", "ping", 1)));
    }

    #[test]
    fn builder_composition_matches_parsed_form() {
        let controllers = Selector::within_package("com.crosscut.controller").unwrap();
        let health = Selector::parse("execution(* *..*.health(..))").unwrap();
        let selector = controllers.and(!health);
        assert!(selector.matches(&sig("com.crosscut.controller.A", "index", 0)));
        assert!(!selector.matches(&sig("com.crosscut.controller.A", "health", 0)));
    }

    #[test]
    fn display_round_trips() {
        let selector = Selector::parse("execution(* com.crosscut..*.find*(*,..)) || !execution(void a.B+.m())").unwrap();
        let reparsed = Selector::parse(&selector.to_string()).unwrap();
        assert_eq!(selector, reparsed);
    }

    #[test]
    fn parse_errors_report_position() {
        let err = Selector::parse("execution(* a.B.m(..)) &&").unwrap_err();
        match err {
            AopError::InvalidSelector { position, .. } => assert_eq!(position, 25),
            other => panic!("unexpected error: {other}"),
        }

        assert!(Selector::parse("within(a.B)").is_err());
        assert!(Selector::parse("execution(* a.B.m(..)").is_err());
        assert!(Selector::parse("execution(* a.B.m)").is_err());
        assert!(Selector::parse("execution(* m(..))").is_err());
        assert!(Selector::parse("execution(* a.B.m(..)) extra").is_err());
    }
}
