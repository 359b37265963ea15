//! 技能标识：封闭枚举，启动时一次性解析

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 可调度的 Agent 技能
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    /// 综合合同分析（编排 Agent）
    ContractAnalysis,
    /// 语义检索条款
    Search,
    /// 风险分析
    RiskAnalysis,
    /// 合同对比
    Compare,
    /// 报告生成
    Report,
}

impl Skill {
    pub const ALL: [Skill; 5] = [
        Skill::ContractAnalysis,
        Skill::Search,
        Skill::RiskAnalysis,
        Skill::Compare,
        Skill::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContractAnalysis => "contract_analysis",
            Self::Search => "search",
            Self::RiskAnalysis => "risk_analysis",
            Self::Compare => "compare",
            Self::Report => "report",
        }
    }

    /// 解析任务名；兼容对外接口中使用的长名称
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "contract_analysis" | "analysis" => Some(Self::ContractAnalysis),
            "search" | "contract_search" => Some(Self::Search),
            "risk_analysis" | "risk" => Some(Self::RiskAnalysis),
            "compare" | "contract_comparison" => Some(Self::Compare),
            "report" | "report_generation" => Some(Self::Report),
            _ => None,
        }
    }

    /// 输出 JSON 中存放 Agent 回复的键
    pub fn output_key(&self) -> &'static str {
        match self {
            Self::ContractAnalysis | Self::RiskAnalysis => "analysis",
            Self::Search => "results",
            Self::Compare => "comparison",
            Self::Report => "report",
        }
    }

    /// 由任务输入组装发给 Agent 的请求
    pub fn build_prompt(&self, input: &Value) -> String {
        let field = |key: &str, default: &str| -> String {
            match input.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => default.to_string(),
                Some(other) => other.to_string(),
            }
        };

        match self {
            Self::ContractAnalysis => format!(
                "Analyze document {}: {}",
                field("document_id", "(unspecified)"),
                field("query", "Analyze this contract")
            ),
            Self::Search => format!(
                "Search contracts for: {} (top_k={}, document={})",
                field("query", ""),
                field("top_k", "5"),
                field("document_id", "all")
            ),
            Self::RiskAnalysis => format!(
                "Analyze document {} for risks.\nCategories: {}\nProvide structured risk assessment.",
                field("document_id", "(unspecified)"),
                field("risk_categories", "all")
            ),
            Self::Compare => format!(
                "Compare contracts: {}\nFocus areas: {}",
                field("document_ids", "[]"),
                field("focus_areas", "all")
            ),
            Self::Report => format!(
                "Generate a {} for document {}.\nFormat: {}",
                field("report_type", "executive_summary"),
                field("document_id", "(unspecified)"),
                field("format", "markdown")
            ),
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
