//! 分类规则表加载（TOML）
//!
//! 规则按文件中的顺序排列，顺序本身是契约的一部分：先出现的规则只要命中（精确或子串）即胜出。
use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, ScanError};

/// 内置规范规则表（与 `rules/default.toml` 为同一份数据）
const BUILTIN_RULES: &str = include_str!("../rules/default.toml");

/// 单条分类规则
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryRule {
    pub category: String,
    #[serde(default)]
    pub exact: Vec<String>,
    #[serde(default)]
    pub contains: Vec<String>,
}

/// 启发式兜底：片段 -> 分类，按顺序检查
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Heuristic {
    pub fragment: String,
    pub category: String,
}

fn default_unclassified() -> String {
    "Unclassified".to_string()
}

/// 顶层规则文件结构
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleTable {
    /// 基线（“能力/启用”）分类，用于判定 enablement-only
    pub baseline: String,
    /// 未命中任何规则与启发式时的兜底分类
    #[serde(default = "default_unclassified")]
    pub unclassified: String,
    #[serde(default)]
    pub rules: Vec<CategoryRule>,
    #[serde(default)]
    pub heuristics: Vec<Heuristic>,
}

impl RuleTable {
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let table: RuleTable = toml::from_str(txt)?;
        table.validate()?;
        Ok(table)
    }

    /// 空字符串作为子串模式会匹配一切，视为非法
    fn validate(&self) -> Result<()> {
        if self.baseline.trim().is_empty() {
            return Err(ScanError::RuleInvalid("baseline category is empty".into()));
        }
        if self.unclassified.trim().is_empty() {
            return Err(ScanError::RuleInvalid("unclassified category is empty".into()));
        }
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.category.trim().is_empty() {
                return Err(ScanError::RuleInvalid(format!("rule #{} has an empty category", idx + 1)));
            }
            if rule.exact.iter().chain(rule.contains.iter()).any(|p| p.is_empty()) {
                return Err(ScanError::RuleInvalid(format!("rule '{}' has an empty pattern", rule.category)));
            }
        }
        for h in &self.heuristics {
            if h.fragment.is_empty() || h.category.trim().is_empty() {
                return Err(ScanError::RuleInvalid("heuristic entries need a fragment and a category".into()));
            }
        }
        Ok(())
    }
}

/// 从 TOML 规则文件加载
pub fn load_rule_table(path: &Path) -> Result<RuleTable> {
    let txt = std::fs::read_to_string(path)
        .map_err(|source| ScanError::RuleFile { path: path.to_path_buf(), source })?;
    RuleTable::from_toml_str(&txt)
}
