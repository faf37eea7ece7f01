//! 搜索词分类器
//!
//! 由 `RuleTable` 预编译（统一小写）而来，构建后不可变。
//! 对同一个词（不区分大小写）总是给出相同结果，与文件和调用顺序无关。
use crate::rules::RuleTable;
use crate::types::{Classification, Confidence};

#[derive(Debug, Clone)]
struct CompiledRule {
    category: String,
    exact: Vec<String>,
    contains: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<CompiledRule>,
    heuristics: Vec<(String, String)>,
    baseline: String,
    fallback: String,
}

impl Categorizer {
    /// `fold_unclassified` 为 true 时兜底分类并入基线分类，否则使用独立的 unclassified 分类
    pub fn new(table: &RuleTable, fold_unclassified: bool) -> Self {
        let lower = |v: &[String]| v.iter().map(|s| s.to_lowercase()).collect::<Vec<_>>();
        let rules = table
            .rules
            .iter()
            .map(|r| CompiledRule { category: r.category.clone(), exact: lower(&r.exact), contains: lower(&r.contains) })
            .collect();
        let heuristics = table
            .heuristics
            .iter()
            .map(|h| (h.fragment.to_lowercase(), h.category.clone()))
            .collect();
        let fallback = if fold_unclassified { table.baseline.clone() } else { table.unclassified.clone() };
        Self { rules, heuristics, baseline: table.baseline.clone(), fallback }
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    /// 兜底分类；报告中该分类始终排在最后
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn categorize(&self, term: &str) -> Classification {
        let tl = term.trim().to_lowercase();

        for rule in &self.rules {
            // 同一规则内：精确匹配优先于子串匹配；跨规则：先命中者胜出
            if rule.exact.iter().any(|e| *e == tl) {
                return Classification { category: rule.category.clone(), confidence: Confidence::High };
            }
            if rule.contains.iter().any(|p| tl.contains(p.as_str())) {
                return Classification { category: rule.category.clone(), confidence: Confidence::Medium };
            }
        }

        for (fragment, category) in &self.heuristics {
            if tl.contains(fragment.as_str()) {
                return Classification { category: category.clone(), confidence: Confidence::Low };
            }
        }

        Classification { category: self.fallback.clone(), confidence: Confidence::Low }
    }
}
