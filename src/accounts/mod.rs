//! Account import from delimited files.
//!
//! Rows are `email|address|private_key`. Proxies are assigned round-robin
//! from a separate file, and every account gets a generated desktop header
//! profile. Glue around the store; the engine itself never creates accounts.

use std::path::Path;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::domain::NewAccount;
use crate::store::Session;

/// Small pool of current desktop user agents for generated header profiles.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

/// Totals reported back to the CLI after an import run.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub total_rows: usize,
    pub added: usize,
    pub skipped_malformed: usize,
    pub duplicates: usize,
    pub errors: Vec<String>,
}

/// Import accounts from `accounts_path`, assigning proxies from
/// `proxies_path` round-robin. Malformed rows and duplicates are counted
/// and skipped, never fatal.
pub fn import_accounts(
    session: &Session,
    accounts_path: &Path,
    proxies_path: Option<&Path>,
) -> Result<ImportReport> {
    let proxies = match proxies_path {
        Some(path) => read_lines(path)
            .with_context(|| format!("failed to read proxy file {}", path.display()))?,
        None => Vec::new(),
    };

    let rows = read_lines(accounts_path)
        .with_context(|| format!("failed to read accounts file {}", accounts_path.display()))?;

    let mut report = ImportReport::default();

    for (index, row) in rows.iter().enumerate() {
        report.total_rows += 1;

        let fields: Vec<&str> = row.split('|').map(str::trim).collect();
        if fields.len() < 3 || fields.iter().take(3).any(|f| f.is_empty()) {
            warn!(row = index + 1, "skipping malformed account row");
            report.skipped_malformed += 1;
            continue;
        }

        let email = fields[0];
        if session.find_account_by_email(email)?.is_some() {
            report.duplicates += 1;
            continue;
        }

        let proxy = if proxies.is_empty() {
            None
        } else {
            Some(proxies[report.added % proxies.len()].clone())
        };

        let new = NewAccount {
            email: email.to_string(),
            address: fields[1].to_string(),
            private_key: fields[2].to_string(),
            proxy,
            headers: generate_header_profile(),
        };

        match session.insert_account(&new) {
            Ok(account) => {
                info!(email = %account.email, "imported account");
                report.added += 1;
            }
            Err(e) => {
                report.errors.push(format!("{}: {:#}", email, e));
            }
        }
    }

    Ok(report)
}

/// A plausible desktop browser header profile for one identity.
pub fn generate_header_profile() -> serde_json::Map<String, serde_json::Value> {
    let user_agent = USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0]);

    let mut headers = serde_json::Map::new();
    headers.insert(
        "User-Agent".to_string(),
        serde_json::Value::String(user_agent.to_string()),
    );
    headers.insert(
        "Accept".to_string(),
        serde_json::Value::String("application/json, text/plain, */*".to_string()),
    );
    headers.insert(
        "Accept-Language".to_string(),
        serde_json::Value::String("en-US,en;q=0.9".to_string()),
    );
    headers
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_import_with_proxies_round_robin() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("test.db")).unwrap();
        let session = store.session().unwrap();

        let accounts = write_file(
            &temp,
            "accounts.csv",
            "a@x.com|0xa|key-a\nb@x.com|0xb|key-b\nc@x.com|0xc|key-c\n",
        );
        let proxies = write_file(
            &temp,
            "proxies.txt",
            "http://p1:8080\nhttp://p2:8080\n",
        );

        let report = import_accounts(&session, &accounts, Some(&proxies)).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.added, 3);
        assert!(report.errors.is_empty());

        let all = session.list_accounts(false).unwrap();
        assert_eq!(all[0].proxy.as_deref(), Some("http://p1:8080"));
        assert_eq!(all[1].proxy.as_deref(), Some("http://p2:8080"));
        assert_eq!(all[2].proxy.as_deref(), Some("http://p1:8080"));
        assert!(!all[0].header("User-Agent").is_empty());
    }

    #[test]
    fn test_malformed_and_duplicate_rows_skipped() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("test.db")).unwrap();
        let session = store.session().unwrap();

        let accounts = write_file(
            &temp,
            "accounts.csv",
            "a@x.com|0xa|key-a\nbroken-row\na@x.com|0xa2|key-a2\n||\n",
        );

        let report = import_accounts(&session, &accounts, None).unwrap();
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.added, 1);
        assert_eq!(report.skipped_malformed, 2);
        assert_eq!(report.duplicates, 1);
    }
}
