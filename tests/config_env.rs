// tests/config_env.rs
//
// File + env layering for AppConfig. Env is process-global, so these run
// serially.

use std::io::Write;

use serial_test::serial;

use alphastream::config::{
    ai::AiConfig, AppConfig, ENV_BUY_THRESHOLD, ENV_CONFIG_PATH, ENV_RRF_K, ENV_SELL_THRESHOLD,
};

fn clear_env() {
    for k in [ENV_CONFIG_PATH, ENV_BUY_THRESHOLD, ENV_SELL_THRESHOLD, ENV_RRF_K] {
        std::env::remove_var(k);
    }
}

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(body.as_bytes()).expect("write config");
    f
}

#[test]
#[serial]
fn explicit_path_is_loaded() {
    clear_env();
    let f = write_config(
        r#"
        [adaptive]
        initial_k = 4
        budget_ms = 800

        [ingest]
        articles_dir = "/tmp/alphastream-inbox"
        "#,
    );
    std::env::set_var(ENV_CONFIG_PATH, f.path());

    let cfg = AppConfig::load().expect("load");
    assert_eq!(cfg.adaptive.initial_k, 4);
    assert_eq!(cfg.adaptive.budget_ms, 800);
    assert_eq!(cfg.adaptive.max_iterations, 4);
    assert_eq!(
        cfg.ingest.articles_dir.as_deref(),
        Some(std::path::Path::new("/tmp/alphastream-inbox"))
    );
    clear_env();
}

#[test]
#[serial]
fn env_overrides_file_thresholds() {
    clear_env();
    let f = write_config("[fusion]\nbuy_threshold = 0.2\nsell_threshold = -0.2\n");
    std::env::set_var(ENV_CONFIG_PATH, f.path());
    std::env::set_var(ENV_BUY_THRESHOLD, "0.45");
    // Sign is normalized: the sell threshold is always negative.
    std::env::set_var(ENV_SELL_THRESHOLD, "0.35");
    std::env::set_var(ENV_RRF_K, "30");

    let cfg = AppConfig::load().expect("load");
    assert!((cfg.fusion.buy_threshold - 0.45).abs() < 1e-6);
    assert!((cfg.fusion.sell_threshold + 0.35).abs() < 1e-6);
    assert!((cfg.retrieval.rrf_k - 30.0).abs() < 1e-6);
    clear_env();
}

#[test]
#[serial]
fn garbage_env_values_are_ignored() {
    clear_env();
    let f = write_config("");
    std::env::set_var(ENV_CONFIG_PATH, f.path());
    std::env::set_var(ENV_BUY_THRESHOLD, "lots");
    std::env::set_var(ENV_RRF_K, "-5");

    let cfg = AppConfig::load().expect("load");
    assert!((cfg.fusion.buy_threshold - 0.3).abs() < 1e-6);
    assert!((cfg.retrieval.rrf_k - 60.0).abs() < 1e-6);
    clear_env();
}

#[test]
#[serial]
fn missing_explicit_path_is_an_error() {
    clear_env();
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    assert!(AppConfig::load().is_err());
    clear_env();
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    clear_env();
    let f = write_config("[adaptive\ninitial_k = ");
    std::env::set_var(ENV_CONFIG_PATH, f.path());
    assert!(AppConfig::load().is_err());
    clear_env();
}

#[test]
fn shipped_ai_config_keeps_the_provider_off() {
    let cfg = AiConfig::load_from_file("config/ai.json").expect("config/ai.json parses");
    assert!(!cfg.enabled);
    assert_eq!(cfg.provider, "openai");
}

#[test]
fn shipped_app_config_matches_defaults() {
    let text = std::fs::read_to_string("config/alphastream.toml").expect("config file");
    let cfg = AppConfig::from_toml_str(&text).expect("parses");
    let d = AppConfig::default();
    assert_eq!(cfg.adaptive.initial_k, d.adaptive.initial_k);
    assert_eq!(cfg.adaptive.max_iterations, d.adaptive.max_iterations);
    assert_eq!(cfg.adaptive.fallback_k, d.adaptive.fallback_k);
    assert_eq!(cfg.history.cache_capacity, d.history.cache_capacity);
    assert!((cfg.fusion.sentiment_weight - d.fusion.sentiment_weight).abs() < 1e-6);
    assert!(cfg.retrieval.retention_days.is_none());
}

#[test]
fn shipped_ticker_aliases_load() {
    let ex = alphastream::store::TickerExtractor::load_from_file(alphastream::DEFAULT_TICKERS_PATH);
    assert_eq!(ex.resolve_alias("Apple"), Some("AAPL"));
    assert_eq!(ex.resolve_alias("salesforce"), Some("CRM"));
    // stoplist falls back to the built-in one
    assert!(!ex.extract("CEO says Salesforce beat").contains("CEO"));
}
