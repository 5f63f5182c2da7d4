use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

/// Typed configuration, loaded from the environment with `.env` support.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub admin_ids: Vec<i64>,

    /// Directory holding the user store file.
    pub data_dir: PathBuf,
    /// Content catalog JSON.
    pub catalog_path: PathBuf,
    /// Optional directory with per-item images (`<id>.jpg`).
    pub images_dir: Option<PathBuf>,

    /// Delay before a consumed free-text flow answer is deleted from the chat.
    pub delete_delay: Duration,

    /// Transient-delivery retry attempts before deferring to the next occurrence.
    pub delivery_attempts: u32,
    /// Base backoff delay for delivery retries (doubles per attempt).
    pub delivery_backoff: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_i64(env_str("ADMIN_IDS"));

        let data_dir = env_path("DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        fs::create_dir_all(&data_dir)?;

        let catalog_path =
            env_path("CATALOG_PATH").unwrap_or_else(|| PathBuf::from("catalog.json"));
        let images_dir = env_path("IMAGES_DIR");

        let delete_delay = Duration::from_millis(env_u64("DELETE_DELAY_MS").unwrap_or(500));
        let delivery_attempts = env_u32("DELIVERY_ATTEMPTS").unwrap_or(3).max(1);
        let delivery_backoff =
            Duration::from_millis(env_u64("DELIVERY_BACKOFF_MS").unwrap_or(1000));

        Ok(Self {
            bot_token,
            admin_ids,
            data_dir,
            catalog_path,
            images_dir,
            delete_delay,
            delivery_attempts,
            delivery_backoff,
        })
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }
}

/// Admin commands are gated on a configured allowlist.
pub fn is_admin(user_id: Option<UserId>, admin_ids: &[i64]) -> bool {
    let Some(user_id) = user_id else {
        return false;
    };
    admin_ids.contains(&user_id.0)
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_admin_ids() {
        assert_eq!(
            parse_csv_i64(Some("1, 2,,3".to_string())),
            vec![1i64, 2, 3]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn admin_check() {
        assert!(is_admin(Some(UserId(7)), &[7, 8]));
        assert!(!is_admin(Some(UserId(9)), &[7, 8]));
        assert!(!is_admin(None, &[7]));
        assert!(!is_admin(Some(UserId(7)), &[]));
    }
}
