use derivative::Derivative;
use serde::Deserialize;

use crate::fork_choice_rule::ForkChoiceRule;

#[derive(Clone, Copy, Debug, Deserialize, Derivative)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BlockTreeConfig {
    pub fork_choice_rule: ForkChoiceRule,
    // Finalization normally keeps the tree down to a few dozen blocks.
    // A tree this large means finality has stalled.
    #[derivative(Default(value = "1024"))]
    pub unfinalized_blocks_warning: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_default_values() -> anyhow::Result<()> {
        let config = serde_json::from_str::<BlockTreeConfig>(
            r#"{"fork_choice_rule": "primary_ancestors"}"#,
        )?;

        assert_eq!(config.fork_choice_rule, ForkChoiceRule::PrimaryAncestors);
        assert_eq!(
            config.unfinalized_blocks_warning,
            BlockTreeConfig::default().unfinalized_blocks_warning,
        );

        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() {
        serde_json::from_str::<BlockTreeConfig>(r#"{"max_leaves": 3}"#)
            .expect_err("unknown field should be rejected");
    }
}
