use crate::config::types::{
    CheckpointConfig, Config, DiscoveryConfig, DiscoveryStrategy, ExtractConfig, ExtractKind,
    FetchConfig, HarvestConfig, StoreConfig,
};
use crate::extract::is_item_ref;
use crate::record::WorkItem;
use crate::ConfigError;
use scraper::Selector;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_fetch_config(&config.fetch)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_store_config(&config.store)?;
    validate_extract_config(&config.extract, "extract")?;
    validate_work_items(&config.work)?;

    if let Some(discovery) = &config.discovery {
        validate_discovery_config(discovery)?;
    }

    if config.work.is_empty() && config.discovery.is_none() {
        return Err(ConfigError::Validation(
            "either [[work]] items or a [discovery] section is required".to_string(),
        ));
    }

    Ok(())
}

/// Validates the `[harvest]` section
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.vendor.trim().is_empty() {
        return Err(ConfigError::Validation("vendor cannot be empty".to_string()));
    }

    if config.records_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "records_path cannot be empty".to_string(),
        ));
    }

    validate_concurrency("harvest.max_concurrent", config.max_concurrent)?;
    validate_identity("harvest.identity", &config.identity)?;

    if let Some(template) = &config.item_url_template {
        validate_template("item_url_template", template, &["{url}", "{label}", "{seed}"])?;
    }

    Ok(())
}

/// Validates the `[fetch]` section
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch.max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch.timeout_secs must be >= 1".to_string(),
        ));
    }

    if !config.backoff_base.is_finite() || config.backoff_base < 1.0 {
        return Err(ConfigError::Validation(format!(
            "fetch.backoff_base must be >= 1.0, got {}",
            config.backoff_base
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "fetch.user_agent cannot be empty".to_string(),
        ));
    }

    if let (Some(min), Some(max)) = (config.politeness_min_ms, config.politeness_max_ms) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "fetch.politeness_min_ms ({}) exceeds politeness_max_ms ({})",
                min, max
            )));
        }
    }

    Ok(())
}

/// Validates the `[checkpoint]` section
fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.retry_delay_ms > 60_000 {
        return Err(ConfigError::Validation(format!(
            "checkpoint.retry_delay_ms must be <= 60000, got {}",
            config.retry_delay_ms
        )));
    }
    Ok(())
}

/// Validates the `[store]` section
fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "store.max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "store.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }

    Ok(())
}

/// Validates an extractor section
fn validate_extract_config(config: &ExtractConfig, section: &str) -> Result<(), ConfigError> {
    if config.fields.is_empty() && config.constants.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} must map at least one field",
            section
        )));
    }

    match config.kind {
        ExtractKind::Html => {
            let row = config.row.as_deref().ok_or_else(|| {
                ConfigError::Validation(format!("{}.row is required for html extraction", section))
            })?;
            parse_selector(row)?;

            for spec in config.fields.values().filter(|s| !is_item_ref(s)) {
                let css = spec.split_once('@').map_or(spec.as_str(), |(css, _)| css);
                if !css.trim().is_empty() {
                    parse_selector(css)?;
                }
            }
        }
        ExtractKind::Json => {
            if let Some(items) = &config.items {
                validate_pointer(items)?;
            }
            for pointer in config.fields.values().filter(|s| !is_item_ref(s)) {
                validate_pointer(pointer)?;
            }
        }
    }

    Ok(())
}

/// Validates static work items
fn validate_work_items(items: &[WorkItem]) -> Result<(), ConfigError> {
    for item in items {
        if item.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "work item url cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Validates the `[discovery]` section
fn validate_discovery_config(config: &DiscoveryConfig) -> Result<(), ConfigError> {
    if config.work_list_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "discovery.work_list_path cannot be empty".to_string(),
        ));
    }

    validate_concurrency("discovery.max_concurrent", config.max_concurrent)?;

    if let Some(body) = &config.body_template {
        let sample = body.replace("{page}", "1").replace("{seed}", "x");
        serde_json::from_str::<serde_json::Value>(&sample).map_err(|e| {
            ConfigError::Validation(format!("discovery.body_template is not JSON: {}", e))
        })?;
    }
    validate_identity("discovery.identity", &config.identity)?;

    match config.strategy {
        DiscoveryStrategy::Pages => {
            validate_discovery_template(config, "{page}")?;

            if config.max_pages < 1 {
                return Err(ConfigError::Validation(
                    "discovery.max_pages must be >= 1".to_string(),
                ));
            }

            if config.empty_page_limit < 1 {
                return Err(ConfigError::Validation(
                    "discovery.empty_page_limit must be >= 1".to_string(),
                ));
            }
        }
        DiscoveryStrategy::Seeds => {
            validate_discovery_template(config, "{seed}")?;

            if config.seeds.is_empty() {
                return Err(ConfigError::Validation(
                    "discovery.seeds must not be empty for the seeds strategy".to_string(),
                ));
            }
        }
    }

    validate_extract_config(&config.extract, "discovery.extract")
}

/// The placeholder may sit in the URL or, for POST listings, in the body
fn validate_discovery_template(config: &DiscoveryConfig, placeholder: &str) -> Result<(), ConfigError> {
    let in_body = config
        .body_template
        .as_deref()
        .is_some_and(|body| body.contains(placeholder));

    if in_body {
        Url::parse(&config.url_template).map_err(|e| {
            ConfigError::InvalidUrl(format!(
                "Invalid discovery.url_template '{}': {}",
                config.url_template, e
            ))
        })?;
        Ok(())
    } else {
        validate_template("discovery.url_template", &config.url_template, &[placeholder])
    }
}

fn validate_concurrency(name: &str, value: usize) -> Result<(), ConfigError> {
    if !(1..=256).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and 256, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_identity(name: &str, fields: &[String]) -> Result<(), ConfigError> {
    if fields.is_empty() {
        return Err(ConfigError::Validation(format!(
            "{} must name at least one field",
            name
        )));
    }

    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "{} contains an empty field name",
            name
        )));
    }

    Ok(())
}

/// Checks that a URL template carries one of the placeholders and is a URL
/// once they are filled in
fn validate_template(name: &str, template: &str, placeholders: &[&str]) -> Result<(), ConfigError> {
    if !placeholders.iter().any(|p| template.contains(p)) {
        return Err(ConfigError::Validation(format!(
            "{} must contain one of {}",
            name,
            placeholders.join(", ")
        )));
    }

    // `{url}` stands for a full URL, so the template alone may not parse
    if template.trim_start().starts_with("{url}") {
        return Ok(());
    }

    let sample = placeholders
        .iter()
        .fold(template.to_string(), |acc, p| acc.replace(p, "1"));
    Url::parse(&sample)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, template, e)))?;

    Ok(())
}

fn parse_selector(css: &str) -> Result<(), ConfigError> {
    Selector::parse(css)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", css, e)))
}

/// JSON pointers are empty or start with '/'
fn validate_pointer(pointer: &str) -> Result<(), ConfigError> {
    if pointer.is_empty() || pointer.starts_with('/') {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "JSON pointer '{}' must be empty or start with '/'",
            pointer
        )))
    }
}
