//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and validation.

#[cfg(test)]
mod tests {
    use crate::config::*;
    use crate::GrantScoutError;

    const MINIMAL: &str = r#"
        [database]
        url = "postgresql://localhost/grants"
        max_connections = 5
        min_connections = 1
        connection_timeout = 10

        [logging]
        level = "debug"
        backtrace = false

        [embeddings]
        endpoint = "http://localhost:11434"
        model = "nomic-embed-text"
        dimension = 768

        [llm]
        llm_endpoint = "https://api.openai.com/v1"
        llm_key = "sk-test"
    "#;

    // ====== Default Value Tests ======

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.llm.llm_model, "gpt-4o");
        assert_eq!(config.llm.classifier_model, "gpt-4o-mini");
        assert_eq!(config.retrieval.default_top_k, 10);
        assert_eq!(config.retrieval.over_fetch_factor, 2);
        assert_eq!(config.retrieval.carryover_score, 1.0);
        assert_eq!(config.ranking.max_shortlist, 10);
        assert_eq!(config.ranking.discovery_policy, PolicyName::Adaptive);
        assert_eq!(config.ranking.followup_policy, PolicyName::Standard);
        assert_eq!(config.session.timeout_secs, 3600);
        assert_eq!(config.server.port, 8000);
        assert!(config.embeddings.api_key.is_none());
    }

    #[test]
    fn test_accessors() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.database_url(), "postgresql://localhost/grants");
        assert_eq!(config.max_connections(), 5);
        assert_eq!(config.min_connections(), 1);
        assert_eq!(config.connection_timeout(), 10);
        assert_eq!(config.llm_key(), "sk-test");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_policy_lookup() {
        let ranking = RankingConfig::default();
        assert_eq!(ranking.policy(PolicyName::Standard).strong, 0.65);
        assert_eq!(ranking.policy(PolicyName::Discovery).weak, 0.48);
        assert_eq!(ranking.policy(PolicyName::Adaptive).fallback_chain, vec![0.35]);
    }

    // ====== Override Tests ======

    #[test]
    fn test_ranking_overrides() {
        let toml = format!(
            "{MINIMAL}\n[ranking]\nmax_shortlist = 6\ndiscovery_policy = \"discovery\"\n\n\
             [ranking.standard]\nstrong = 0.7\nweak = 0.5\nfallback_chain = []\nmin_open = 0\n"
        );
        let config = AppConfig::from_toml_str(&toml).unwrap();
        assert_eq!(config.ranking.max_shortlist, 6);
        assert_eq!(config.ranking.discovery_policy, PolicyName::Discovery);
        assert_eq!(config.ranking.standard.strong, 0.7);
        assert_eq!(config.ranking.adaptive.weak, 0.5);
    }

    // ====== Validation Tests ======

    #[test]
    fn test_zero_shortlist_rejected() {
        let toml = format!("{MINIMAL}\n[ranking]\nmax_shortlist = 0\n");
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(GrantScoutError::Config(_))
        ));
    }

    #[test]
    fn test_inverted_policy_rejected() {
        let toml = format!(
            "{MINIMAL}\n[ranking.standard]\nstrong = 0.4\nweak = 0.6\nfallback_chain = []\nmin_open = 0\n"
        );
        assert!(AppConfig::from_toml_str(&toml).is_err());
    }

    #[test]
    fn test_bad_grant_id_pattern_rejected() {
        let toml = format!("{MINIMAL}\n[retrieval]\ngrant_id_pattern = \"(unclosed\"\n");
        assert!(matches!(
            AppConfig::from_toml_str(&toml),
            Err(GrantScoutError::Config(_))
        ));
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        assert!(matches!(
            AppConfig::from_toml_str("[logging]\nlevel = \"info\"\nbacktrace = true\n"),
            Err(GrantScoutError::TomlParsing(_))
        ));
    }

    #[test]
    fn test_round_trip() {
        let config = AppConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.ranking.max_cards, config.ranking.max_cards);
        assert_eq!(parsed.retrieval.grant_id_pattern, config.retrieval.grant_id_pattern);
        assert_eq!(parsed.embeddings.dimension, config.embeddings.dimension);
    }
}
