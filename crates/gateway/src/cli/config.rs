use ck_domain::config::{Config, ConfigSeverity};

/// Validation report for `config validate`, plus whether the config is
/// usable (warnings allowed, errors not).
pub fn report(config: &Config, config_path: &str) -> (String, bool) {
    let issues = config.validate();
    if issues.is_empty() {
        return (format!("Config OK ({config_path})"), true);
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    let mut out: Vec<String> = issues.iter().map(ToString::to_string).collect();
    out.push(format!(
        "\n{error_count} error(s), {warning_count} warning(s) in {config_path}"
    ));
    (out.join("\n"), error_count == 0)
}

/// Print the validation report. Returns false when errors were found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let (text, ok) = report(config, config_path);
    println!("{text}");
    ok
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)?;
    print!("{output}");
    Ok(())
}
