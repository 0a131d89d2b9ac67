//! Config command - print the effective configuration.

use talkbox_config::Config;

/// Print `config` as TOML.
pub(crate) fn show(config: &Config) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    print!("{rendered}");
    Ok(())
}
