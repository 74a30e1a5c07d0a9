use std::collections::HashMap;

/// ValidationRuleProvider は対象エンティティごとの既定検証ルールを提供するトレイト。
/// ルールはエンジンにとって不透明であり、Record Processor のみが解釈する。
#[cfg_attr(test, mockall::automock)]
pub trait ValidationRuleProvider: Send + Sync {
    fn default_rules(&self, target_entity: &str) -> serde_json::Value;
}

/// ConfiguredValidationRuleProvider は設定ファイルの validation_rules を返す実装。
pub struct ConfiguredValidationRuleProvider {
    rules: HashMap<String, serde_json::Value>,
}

impl ConfiguredValidationRuleProvider {
    pub fn new(rules: HashMap<String, serde_json::Value>) -> Self {
        Self { rules }
    }
}

impl ValidationRuleProvider for ConfiguredValidationRuleProvider {
    fn default_rules(&self, target_entity: &str) -> serde_json::Value {
        self.rules.get(target_entity).cloned().unwrap_or_else(|| {
            serde_json::json!({
                "target_entity": target_entity,
                "trim_whitespace": true,
                "skip_blank_records": true,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_rules_are_returned() {
        let mut rules = HashMap::new();
        rules.insert(
            "contract".to_string(),
            serde_json::json!({"required": ["policy_no"]}),
        );
        let provider = ConfiguredValidationRuleProvider::new(rules);
        assert_eq!(
            provider.default_rules("contract"),
            serde_json::json!({"required": ["policy_no"]})
        );
    }

    #[test]
    fn test_fallback_rules_name_the_entity() {
        let provider = ConfiguredValidationRuleProvider::new(HashMap::new());
        let rules = provider.default_rules("claim");
        assert_eq!(rules["target_entity"], "claim");
        assert_eq!(rules["trim_whitespace"], true);
    }
}
