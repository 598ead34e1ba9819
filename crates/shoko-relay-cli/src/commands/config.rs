use super::context::AppContext;
use super::prompts;
use crate::output::{mask_secret, new_table, Output};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde_json::json;
use shoko_relay_config::{default_scheduler_config, Config, CredentialStore, PathManager, PlexConfig, ShokoConfig};
use shoko_relay_sources::plex::{verify_token, PlexHttpClient};
use shoko_relay_sources::{ShokoHttpClient, ShokoUserData};
use std::time::Duration;

pub async fn run_config(cmd: crate::ConfigCommands, output: &Output) -> Result<()> {
    match cmd {
        crate::ConfigCommands::Show { full } => show_config(full, output),
        crate::ConfigCommands::Plex {
            token,
            server_url,
            library_section,
            user,
        } => configure_plex(token, server_url, library_section, user, output).await,
        crate::ConfigCommands::Shoko { api_key, server_url } => configure_shoko(api_key, server_url, output).await,
        crate::ConfigCommands::Validate => validate_config(output),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.blue} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn enabled_mark(enabled: bool) -> String {
    if enabled {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

fn secret(value: Option<&String>, full: bool) -> String {
    match value {
        Some(v) if full => v.clone(),
        Some(v) => mask_secret(v),
        None => "<not set>".to_string(),
    }
}

fn load_or_default(path_manager: &PathManager, output: &Output) -> Result<Config> {
    let config_file = path_manager.config_file();
    if config_file.exists() {
        Config::load_from_file(&config_file)
            .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))
    } else {
        output.info("Configuration file not found. Creating default configuration...");
        Ok(Config {
            scheduler: Some(default_scheduler_config()),
            ..Config::default()
        })
    }
}

fn load_credentials(path_manager: &PathManager) -> Result<CredentialStore> {
    let credentials_file = path_manager.credentials_file();
    let mut store = CredentialStore::new(credentials_file.clone());
    store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    Ok(store)
}

fn save_all(path_manager: &PathManager, config: &Config, credentials: &CredentialStore) -> Result<()> {
    config
        .validate()
        .map_err(|e| eyre!("Configuration is not valid: {}", e))?;
    let config_file = path_manager.config_file();
    config
        .save_to_file(&config_file)
        .map_err(|e| eyre!("Failed to save config to {}: {}", config_file.display(), e))?;
    credentials
        .save()
        .map_err(|e| eyre!("Failed to save credentials to {}: {}", path_manager.credentials_file().display(), e))?;
    Ok(())
}

fn show_config(full: bool, output: &Output) -> Result<()> {
    let ctx = AppContext::load()?;
    let config = &ctx.config;
    let credentials = &ctx.credentials;

    if !output.is_human() {
        let mut document = serde_json::to_value(config)?;
        document["config_file"] = json!(ctx.paths.config_file());
        document["credentials"] = json!({
            "plex_token": secret(credentials.get_plex_token(), full),
            "shoko_api_key": secret(credentials.get_shoko_api_key(), full),
        });
        output.json(&document);
        return Ok(());
    }

    output.section("Configuration");
    let mut files = new_table(["File", "Path"]);
    files.add_row(vec!["Config".to_string(), ctx.paths.config_file().display().to_string()]);
    files.add_row(vec!["Credentials".to_string(), ctx.paths.credentials_file().display().to_string()]);
    files.add_row(vec!["Reports".to_string(), ctx.paths.reports_dir().display().to_string()]);
    output.table(&files);

    let mut mapping = new_table(["Mapping", ""]);
    mapping.add_row(vec![
        "TMDB episode numbering".to_string(),
        enabled_mark(config.mapping.tmdb_episode_numbering),
    ]);
    mapping.add_row(vec!["Ordering source".to_string(), format!("{:?}", config.mapping.ordering_source)]);
    mapping.add_row(vec![
        "Mixed-type files".to_string(),
        format!("{:?}", config.mapping.ambiguous_type_policy),
    ]);
    output.table(&mapping);

    match &config.plex {
        Some(plex) => {
            let mut table = new_table(["Plex", ""]);
            table.add_row(vec!["Enabled".to_string(), enabled_mark(plex.enabled)]);
            table.add_row(vec!["Server URL".to_string(), plex.server_url.clone()]);
            table.add_row(vec!["Library section".to_string(), plex.library_section.clone()]);
            table.add_row(vec!["Admin token".to_string(), secret(credentials.get_plex_token(), full)]);
            for user in &plex.extra_users {
                table.add_row(vec![
                    format!("Token for {}", user),
                    secret(credentials.get_plex_user_token(user), full),
                ]);
            }
            output.table(&table);
        }
        None => output.warn("Plex is not configured (shoko-relay config plex)"),
    }

    match &config.shoko {
        Some(shoko) => {
            let mut table = new_table(["Shoko", ""]);
            table.add_row(vec!["Enabled".to_string(), enabled_mark(shoko.enabled)]);
            table.add_row(vec!["Server URL".to_string(), shoko.server_url.clone()]);
            table.add_row(vec!["API key".to_string(), secret(credentials.get_shoko_api_key(), full)]);
            output.table(&table);
        }
        None => output.warn("Shoko is not configured (shoko-relay config shoko)"),
    }

    let mut vfs = new_table(["VFS", ""]);
    vfs.add_row(vec![
        "Root".to_string(),
        config
            .vfs
            .root
            .as_ref()
            .map(|r| r.display().to_string())
            .unwrap_or_else(|| "<not set>".to_string()),
    ]);
    vfs.add_row(vec!["Clean before linking".to_string(), enabled_mark(config.vfs.clean)]);
    for mapping in &config.vfs.path_mappings {
        vfs.add_row(vec!["Path mapping".to_string(), format!("{} → {}", mapping.from, mapping.to)]);
    }
    output.table(&vfs);

    let sync = &config.watched_sync;
    let mut watched = new_table(["Watched sync", ""]);
    watched.add_row(vec!["Enabled".to_string(), enabled_mark(sync.enabled)]);
    watched.add_row(vec!["Dry run".to_string(), enabled_mark(sync.dry_run)]);
    watched.add_row(vec!["Extra users".to_string(), enabled_mark(sync.include_extra_users)]);
    watched.add_row(vec![
        "Lookback".to_string(),
        sync.lookback_hours
            .map(|h| format!("{} hours", h))
            .unwrap_or_else(|| "everything".to_string()),
    ]);
    output.table(&watched);

    let scheduler = config.scheduler.clone().unwrap_or_else(default_scheduler_config);
    let mut schedule = new_table(["Scheduler", ""]);
    schedule.add_row(vec!["Schedule".to_string(), scheduler.schedule]);
    schedule.add_row(vec!["Timezone".to_string(), scheduler.timezone]);
    schedule.add_row(vec!["Run on startup".to_string(), enabled_mark(scheduler.run_on_startup)]);
    output.table(&schedule);
    Ok(())
}

async fn configure_plex(
    token_arg: Option<String>,
    server_url_arg: Option<String>,
    library_section_arg: Option<String>,
    user: Option<String>,
    output: &Output,
) -> Result<()> {
    let path_manager = PathManager::default();
    path_manager
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create configuration directories: {}", e))?;
    let mut config = load_or_default(&path_manager, output)?;
    let mut credentials = load_credentials(&path_manager)?;

    output.section("Plex Setup");

    let token = match token_arg {
        Some(token) => token,
        None => {
            let prompt = match &user {
                Some(user) => format!("Plex token for {}", user),
                None => "Plex admin token".to_string(),
            };
            prompts::prompt_secret(&prompt)?
        }
    };
    let token = prompts::require_value(token, "Plex token")?;

    // Extra users share the admin's server and section
    if let Some(user) = user {
        let plex = config
            .plex
            .as_mut()
            .ok_or_else(|| eyre!("Configure the Plex admin first: shoko-relay config plex"))?;
        if !plex.extra_users.iter().any(|u| u.eq_ignore_ascii_case(&user)) {
            plex.extra_users.push(user.clone());
        }
        credentials.set_plex_user_token(&user, token);
        save_all(&path_manager, &config, &credentials)?;
        output.success(format!("Token stored for Plex user {}", user));
        return Ok(());
    }

    let spin = spinner("Verifying token with plex.tv...");
    let verified = verify_token(&token).await;
    spin.finish_and_clear();
    match verified {
        Ok(true) => output.success("Token verified"),
        Ok(false) => {
            output.warn("Token verification failed. The token may be invalid.");
            if !prompts::prompt_yes_no("Continue anyway?", false)? {
                return Err(eyre!("Token verification failed"));
            }
        }
        Err(e) => output.warn(format!("Could not verify token: {}. Continuing anyway...", e)),
    }

    let existing = config.plex.clone();
    let server_url = match server_url_arg {
        Some(url) => url,
        None => prompts::prompt_string(
            "Plex server URL",
            Some(existing.as_ref().map(|p| p.server_url.as_str()).unwrap_or("http://127.0.0.1:32400")),
        )?,
    };
    let server_url = server_url.trim().trim_end_matches('/').to_string();

    let library_section = match library_section_arg {
        Some(section) => section,
        None => {
            list_show_libraries(&token, &server_url, output).await;
            prompts::prompt_string(
                "Library section key",
                existing.as_ref().map(|p| p.library_section.as_str()),
            )?
        }
    };

    config.plex = Some(PlexConfig {
        enabled: true,
        server_url,
        library_section,
        extra_users: existing.map(|p| p.extra_users).unwrap_or_default(),
    });
    credentials.set_plex_token(token);
    save_all(&path_manager, &config, &credentials)?;
    output.success("Plex configuration saved");
    Ok(())
}

/// Best effort: shows the show libraries on the server to pick a section from
async fn list_show_libraries(token: &str, server_url: &str, output: &Output) {
    let libraries = match PlexHttpClient::new(token, server_url) {
        Ok(client) => client.get_libraries().await,
        Err(e) => Err(e),
    };
    match libraries {
        Ok(libraries) => {
            let mut table = new_table(["Key", "Title", "Agent"]);
            for library in libraries.iter().filter(|l| l.type_ == "show") {
                table.add_row(vec![library.key.clone(), library.title.clone(), library.agent.clone()]);
            }
            output.table(&table);
        }
        Err(e) => output.warn(format!("Could not list Plex libraries: {}", e)),
    }
}

async fn configure_shoko(api_key_arg: Option<String>, server_url_arg: Option<String>, output: &Output) -> Result<()> {
    let path_manager = PathManager::default();
    path_manager
        .ensure_directories()
        .map_err(|e| eyre!("Failed to create configuration directories: {}", e))?;
    let mut config = load_or_default(&path_manager, output)?;
    let mut credentials = load_credentials(&path_manager)?;

    output.section("Shoko Setup");

    let server_url = match server_url_arg {
        Some(url) => url,
        None => prompts::prompt_string(
            "Shoko server URL",
            Some(config.shoko.as_ref().map(|s| s.server_url.as_str()).unwrap_or("http://127.0.0.1:8111")),
        )?,
    };
    let server_url = server_url.trim().trim_end_matches('/').to_string();

    let api_key = match api_key_arg {
        Some(key) => key,
        None => prompts::prompt_secret("Shoko API key")?,
    };
    let api_key = prompts::require_value(api_key, "Shoko API key")?;

    let spin = spinner("Checking Shoko server...");
    let check = match ShokoHttpClient::new(&server_url, &api_key) {
        Ok(client) => client.list_users().await,
        Err(e) => Err(e),
    };
    spin.finish_and_clear();
    match check {
        Ok(users) => output.success(format!("Connected to Shoko ({} users)", users.len())),
        Err(e) => {
            output.warn(format!("Could not reach Shoko: {}", e));
            if !prompts::prompt_yes_no("Save anyway?", false)? {
                return Err(eyre!("Shoko check failed"));
            }
        }
    }

    config.shoko = Some(ShokoConfig {
        enabled: true,
        server_url,
    });
    credentials.set_shoko_api_key(api_key);
    save_all(&path_manager, &config, &credentials)?;
    output.success("Shoko configuration saved");
    Ok(())
}

/// Problems that would stop a command from running, as readable messages
fn credential_problems(config: &Config, credentials: &CredentialStore) -> Vec<String> {
    let mut problems = Vec::new();
    if let Some(plex) = config.plex.as_ref().filter(|p| p.enabled) {
        if credentials.get_plex_token().is_none() {
            problems.push("Plex admin token is missing".to_string());
        }
        for user in &plex.extra_users {
            if credentials.get_plex_user_token(user).is_none() {
                problems.push(format!("Plex token for extra user '{}' is missing", user));
            }
        }
    }
    if config.is_shoko_configured() && credentials.get_shoko_api_key().is_none() {
        problems.push("Shoko API key is missing".to_string());
    }
    problems
}

fn validate_config(output: &Output) -> Result<()> {
    // AppContext::load runs Config::validate
    let ctx = AppContext::load()?;
    if !ctx.paths.config_file().exists() {
        output.warn(format!("No configuration file at {}", ctx.paths.config_file().display()));
    }

    let problems = credential_problems(&ctx.config, &ctx.credentials);
    let services = ctx.config.get_configured_services();

    if output.is_human() {
        for problem in &problems {
            output.warn(problem);
        }
        if services.is_empty() {
            output.warn("Neither Shoko nor Plex is configured");
        } else {
            output.info(format!("Configured services: {}", services.join(", ")));
        }
    } else {
        output.json(&json!({ "services": services, "problems": problems }));
    }

    if problems.is_empty() {
        output.success("Configuration is valid");
        Ok(())
    } else {
        Err(eyre!("{} problems found", problems.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_credential_problems() {
        let config = Config {
            plex: Some(PlexConfig {
                enabled: true,
                server_url: "http://localhost:32400".to_string(),
                library_section: "1".to_string(),
                extra_users: vec!["Kid".to_string()],
            }),
            shoko: Some(ShokoConfig {
                enabled: true,
                server_url: "http://localhost:8111".to_string(),
            }),
            ..Config::default()
        };
        let mut credentials = CredentialStore::new(PathBuf::from("/tmp/unused"));
        assert_eq!(credential_problems(&config, &credentials).len(), 3);

        credentials.set_plex_token("admin".to_string());
        credentials.set_plex_user_token("kid", "kid".to_string());
        credentials.set_shoko_api_key("key".to_string());
        assert!(credential_problems(&config, &credentials).is_empty());
    }

    #[test]
    fn test_secret_masking() {
        let value = "abcdefgh".to_string();
        assert_eq!(secret(Some(&value), false), "ab***gh");
        assert_eq!(secret(Some(&value), true), "abcdefgh");
        assert_eq!(secret(None, true), "<not set>");
    }
}
