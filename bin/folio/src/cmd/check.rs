//! Check command - validate configuration and content

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use color_eyre::eyre::{Result, bail};
use folio_core::{Config, ContentItem};
use folio_generator::{
    CancelToken, ContentGateway, MarkdownGateway,
    route::{LIST_OUTPUT_PATHS, resolve, windows_path_issues},
};

use super::build::project_root;

/// Validation result.
#[derive(Debug, Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Run the check command.
///
/// Validates configuration and all content files without writing anything.
pub fn run(config_path: &Path, strict: bool) -> Result<()> {
    tracing::info!(?config_path, strict, "Checking configuration and content");

    let mut result = ValidationResult::default();
    let root = project_root(config_path);

    println!("Checking configuration...");
    let config = match Config::load_with_env(config_path) {
        Ok(c) => {
            println!("  ✓ Configuration valid");
            Some(c)
        }
        Err(e) => {
            result.add_error(format!("Configuration error: {e}"));
            println!("  ✗ Configuration invalid: {e}");
            None
        }
    };

    if let Some(ref cfg) = config {
        println!("\nChecking directories...");
        for warning in quick_validate(cfg, root) {
            result.add_warning(warning);
        }

        println!("\nChecking content files...");
        let gateway = MarkdownGateway::from_config(cfg, root).with_drafts(cfg.build.drafts);
        match gateway.load(&CancelToken::new()) {
            Ok(items) => {
                println!("  ✓ {} content file(s) parsed", items.len());
                check_routes(cfg, &items, &mut result);
                check_translations(cfg, &items, &mut result);
            }
            Err(e) => {
                result.add_error(format!("Content error: {e}"));
                println!("  ✗ Content invalid: {e}");
            }
        }
    }

    println!();
    println!("Summary:");
    println!("  Errors:   {}", result.errors.len());
    println!("  Warnings: {}", result.warnings.len());

    if result.has_errors() {
        println!();
        println!("Errors:");
        for err in &result.errors {
            println!("  ✗ {err}");
        }
    }

    if result.has_warnings() {
        println!();
        println!("Warnings:");
        for warn in &result.warnings {
            println!("  ⚠ {warn}");
        }
    }

    if result.has_errors() {
        bail!("Validation failed with {} error(s)", result.errors.len());
    }

    if strict && result.has_warnings() {
        bail!(
            "Validation failed with {} warning(s) (strict mode)",
            result.warnings.len()
        );
    }

    println!();
    println!("✓ All checks passed");

    Ok(())
}

/// Quick validation for issues that should not block a build.
pub fn quick_validate(config: &Config, root: &Path) -> Vec<String> {
    let mut warnings = Vec::new();

    let content = root.join(&config.build.content_dir);
    if !content.is_dir() {
        warnings.push(format!(
            "Content directory does not exist: {}",
            content.display()
        ));
    }

    let theme = root.join(&config.build.theme_dir);
    if !theme.join("templates").is_dir() {
        warnings.push(format!(
            "No templates under {}, using built-in templates",
            theme.display()
        ));
    }

    let output = root.join(&config.build.output_dir);
    if output.exists() && !output.is_dir() {
        warnings.push(format!(
            "Output path exists but is not a directory: {}",
            output.display()
        ));
    }

    warnings
}

/// Language an item builds under: its own, else the default.
fn item_language<'a>(config: &'a Config, item: &'a ContentItem) -> Option<&'a str> {
    item.language().or_else(|| config.default_language())
}

/// Report colliding and non-portable output paths per language.
fn check_routes(config: &Config, items: &[ContentItem], result: &mut ValidationResult) {
    let mut claimed: HashMap<(Option<&str>, String), &str> = HashMap::new();
    let mut issues = 0;

    for item in items.iter().filter(|i| !i.is_data()) {
        let route = resolve(item, config.build.output_path_encoding);

        for issue in windows_path_issues(&route.output_path) {
            issues += 1;
            result.add_warning(format!(
                "{}: output path '{}' is not portable ({issue})",
                item.id, route.output_path
            ));
        }

        if LIST_OUTPUT_PATHS.contains(&route.output_path.as_str()) {
            result.add_warning(format!(
                "{}: output path '{}' belongs to a list view, the page is dropped",
                item.id, route.output_path
            ));
            continue;
        }

        let key = (item_language(config, item), route.output_path.clone());
        if let Some(first) = claimed.insert(key, &item.id) {
            result.add_warning(format!(
                "{}: output path '{}' already used by {first}",
                item.id, route.output_path
            ));
        }
    }

    if issues == 0 {
        println!("  ✓ Output paths are portable");
    }
}

/// Report i18n groups missing a configured language.
fn check_translations(config: &Config, items: &[ContentItem], result: &mut ValidationResult) {
    if config.site.languages.len() <= 1 {
        println!("  ✓ Single language configured, skipping translation checks");
        return;
    }

    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for item in items.iter().filter(|i| !i.is_data()) {
        if let (Some(key), Some(lang)) = (item.i18n_key(), item_language(config, item)) {
            groups.entry(key).or_default().push(lang);
        }
    }

    let mut missing = 0;
    for (key, present) in &groups {
        for lang in &config.site.languages {
            if !present.contains(&lang.as_str()) {
                missing += 1;
                result.add_warning(format!("Missing translation: i18nKey '{key}' has no '{lang}' page"));
            }
        }
    }

    if missing == 0 {
        println!(
            "  ✓ {} translation group(s) complete ({} languages)",
            groups.len(),
            config.site.languages.len()
        );
    } else {
        println!("  ⚠ {missing} missing translation(s)");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use folio_core::Value;

    use super::*;

    fn item(id: &str, slug: &str, lang: Option<&str>, key: Option<&str>) -> ContentItem {
        let mut item = ContentItem::new(id, id, slug, Utc::now());
        if let Some(lang) = lang {
            item = item.with_meta("language", Value::text(lang));
        }
        if let Some(key) = key {
            item = item.with_meta("i18nKey", Value::text(key));
        }
        item
    }

    fn config() -> Config {
        let mut config = Config::new("Site", "https://example.com");
        config.site.languages = vec!["en".into(), "zh".into()];
        config
    }

    #[test]
    fn test_duplicate_routes_are_per_language() {
        let items = vec![
            item("a", "about", None, None),
            item("b", "about", Some("zh"), None),
            item("c", "about", Some("en"), None),
        ];
        let mut result = ValidationResult::default();
        check_routes(&config(), &items, &mut result);

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("c:"));
    }

    #[test]
    fn test_route_onto_list_view() {
        let landing = item("landing", "landing", None, None)
            .with_meta("url", Value::text("/"))
            .with_meta("outputPath", Value::text("index.html"))
            .with_meta("template", Value::text("pages/landing.html"));
        let mut result = ValidationResult::default();
        check_routes(&config(), &[landing], &mut result);

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("belongs to a list view"));
    }

    #[test]
    fn test_non_portable_route() {
        let items = vec![item("a", "con", None, None)];
        let mut result = ValidationResult::default();
        check_routes(&config(), &items, &mut result);

        assert!(result.warnings[0].contains("reserved device name"));
    }

    #[test]
    fn test_missing_translation() {
        let items = vec![
            item("a", "about", None, Some("about")),
            item("b", "guanyu", Some("zh"), Some("about")),
            item("c", "contact", None, Some("contact")),
        ];
        let mut result = ValidationResult::default();
        check_translations(&config(), &items, &mut result);

        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("'contact' has no 'zh'"));
    }

    #[test]
    fn test_quick_validate_missing_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let warnings = quick_validate(&config(), dir.path());
        assert_eq!(warnings.len(), 2);
    }
}
