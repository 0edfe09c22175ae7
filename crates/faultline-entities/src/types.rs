use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Deployment environment an exception was reported from.
///
/// SDK payloads use free-form environment strings; `from_sdk_value` is the
/// lossy lookup table used by the normalizer. Unknown values fall back to
/// `Production` at the call site.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Environment {
    #[sea_orm(string_value = "production")]
    Production,
    #[sea_orm(string_value = "staging")]
    Staging,
    #[sea_orm(string_value = "development")]
    Development,
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
        }
    }

    /// Case-insensitive lookup over the vendor aliases SDKs send.
    pub fn from_sdk_value(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Some(Environment::Production),
            "staging" | "stage" => Some(Environment::Staging),
            "development" | "dev" | "test" => Some(Environment::Development),
            _ => None,
        }
    }
}

/// SDK platform/framework the reporting client runs on.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Platform {
    #[sea_orm(string_value = "react")]
    React,
    #[sea_orm(string_value = "react_native")]
    ReactNative,
    #[sea_orm(string_value = "expo")]
    Expo,
    #[sea_orm(string_value = "node_js")]
    NodeJs,
    #[sea_orm(string_value = "nest_js")]
    NestJs,
    #[sea_orm(string_value = "next_js")]
    NextJs,
    #[sea_orm(string_value = "python")]
    Python,
    #[sea_orm(string_value = "java")]
    Java,
}

impl Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::React => "react",
            Platform::ReactNative => "react_native",
            Platform::Expo => "expo",
            Platform::NodeJs => "node_js",
            Platform::NestJs => "nest_js",
            Platform::NextJs => "next_js",
            Platform::Python => "python",
            Platform::Java => "java",
        }
    }

    /// Case-insensitive lookup over the vendor platform names SDKs send.
    /// Unrecognized platforms stay unset rather than failing normalization.
    pub fn from_sdk_value(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "javascript" | "browser" | "react" => Some(Platform::React),
            "react-native" => Some(Platform::ReactNative),
            "expo" => Some(Platform::Expo),
            "node" | "nodejs" => Some(Platform::NodeJs),
            "nestjs" => Some(Platform::NestJs),
            "nextjs" => Some(Platform::NextJs),
            "python" => Some(Platform::Python),
            "java" => Some(Platform::Java),
            _ => None,
        }
    }
}

/// Lifecycle status of an issue.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum IssueStatus {
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "ignored")]
    Ignored,
}

impl Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl IssueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Resolved => "resolved",
            IssueStatus::Ignored => "ignored",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(IssueStatus::Open),
            "resolved" => Some(IssueStatus::Resolved),
            "ignored" => Some(IssueStatus::Ignored),
            _ => None,
        }
    }
}

/// Issue severity. New issues start at `Medium`.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Severity {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "critical")]
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// HTTP verb captured in an exception's request context.
/// NOTE: Use db_type = "Text" for SQLite compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DeriveActiveEnum, EnumIter)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum HttpMethod {
    #[sea_orm(string_value = "GET")]
    Get,
    #[sea_orm(string_value = "POST")]
    Post,
    #[sea_orm(string_value = "PUT")]
    Put,
    #[sea_orm(string_value = "DELETE")]
    Delete,
    #[sea_orm(string_value = "PATCH")]
    Patch,
    #[sea_orm(string_value = "OPTIONS")]
    Options,
    #[sea_orm(string_value = "HEAD")]
    Head,
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Head => "HEAD",
        }
    }

    /// Case-insensitive parse; anything that is not a known verb stays unset.
    pub fn from_sdk_value(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "PUT" => Some(HttpMethod::Put),
            "DELETE" => Some(HttpMethod::Delete),
            "PATCH" => Some(HttpMethod::Patch),
            "OPTIONS" => Some(HttpMethod::Options),
            "HEAD" => Some(HttpMethod::Head),
            _ => None,
        }
    }
}
