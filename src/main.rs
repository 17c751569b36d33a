//! pwvault command line
//!
//! Usage:
//!   pwvault init                       # Create an empty database
//!   pwvault audit                      # Audit and print the report as JSON
//!   pwvault list                       # List records (no secrets)
//!   pwvault import FILE                # Import a plaintext CSV
//!   pwvault export                     # Print all records as plaintext CSV
//!
//! Options:
//!   --db PATH        Database path (default ~/.pwvault/passwords.db)
//!   --config PATH    JSON config (KDF cost, backups)
//!   --keyfile PATH   Optional keyfile mixed into the master key
//!   --repair         Open even if the integrity hash does not match
//!
//! The master password is read from PWVAULT_PASSWORD.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use zeroize::Zeroizing;

use std::path::PathBuf;

use pwvault::{Credentials, Database, IntegrityCheck, StoreConfig};

const DEFAULT_DB_PATH: &str = ".pwvault/passwords.db";
const PASSWORD_ENV: &str = "PWVAULT_PASSWORD";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Init,
    Audit,
    List,
    Import(PathBuf),
    Export,
}

struct Options {
    command: Command,
    db_path: PathBuf,
    config: StoreConfig,
    keyfile: Option<PathBuf>,
    check: IntegrityCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive("pwvault=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_options(&args)?;
    let password = Zeroizing::new(
        std::env::var(PASSWORD_ENV).with_context(|| format!("{} is not set", PASSWORD_ENV))?,
    );

    tracing::info!("Database: {:?}", options.db_path);

    // Argon2id at default cost takes a while; keep it off the async workers
    let output = tokio::task::spawn_blocking(move || run(&options, &password)).await??;
    if !output.is_empty() {
        println!("{}", output.as_str());
    }
    Ok(())
}

fn parse_options(args: &[String]) -> Result<Options> {
    let command = match args.get(1).map(String::as_str) {
        None | Some("audit") => Command::Audit,
        Some("init") => Command::Init,
        Some("list") => Command::List,
        Some("export") => Command::Export,
        Some("import") => {
            let file = args
                .get(2)
                .filter(|a| !a.starts_with("--"))
                .ok_or_else(|| anyhow!("import needs a CSV file"))?;
            Command::Import(PathBuf::from(file))
        }
        Some(flag) if flag.starts_with("--") => Command::Audit,
        Some(other) => bail!("unknown command: {}", other),
    };

    let db_path = match get_arg(args, "--db") {
        Some(path) => PathBuf::from(path),
        None => dirs::home_dir()
            .ok_or_else(|| anyhow!("could not find home directory"))?
            .join(DEFAULT_DB_PATH),
    };

    let config = match get_arg(args, "--config") {
        Some(path) => StoreConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => StoreConfig::default(),
    };
    config.kdf.validate()?;

    let check = if args.iter().any(|a| a == "--repair") {
        IntegrityCheck::Skip
    } else {
        IntegrityCheck::Enforce
    };

    Ok(Options {
        command,
        db_path,
        config,
        keyfile: get_arg(args, "--keyfile").map(PathBuf::from),
        check,
    })
}

fn run(options: &Options, password: &str) -> Result<Zeroizing<String>> {
    let keyfile = options.keyfile.as_deref();

    if options.command == Command::Init {
        Database::create(&options.db_path, password, keyfile, options.config.clone())?;
        return Ok(Zeroizing::new(String::new()));
    }

    let credentials = Credentials::Password { password, keyfile };
    let mut db = Database::open(&options.db_path, credentials, options.config.clone(), options.check)?;
    if options.check == IntegrityCheck::Skip {
        // Rewrite with a fresh hash so the next open passes
        db.save()?;
    }

    let output = match &options.command {
        Command::Init => String::new(),
        Command::Audit => {
            let report = db.audit(Utc::now())?;
            db.save()?;
            serde_json::to_string_pretty(&report)?
        }
        Command::List => serde_json::to_string_pretty(&db.store()?.summaries())?,
        Command::Import(file) => {
            let text = Zeroizing::new(
                std::fs::read_to_string(file).with_context(|| format!("reading {:?}", file))?,
            );
            let summary = db.store_mut()?.import_csv(&text, Utc::now())?;
            db.save()?;
            serde_json::to_string_pretty(&summary)?
        }
        Command::Export => return Ok(db.store()?.export_csv()?),
    };
    Ok(Zeroizing::new(output))
}

fn get_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pwvault::{KdfParams, RecordDraft, VaultError};
    use tempfile::TempDir;

    fn options(tmp: &TempDir, command: Command) -> Options {
        Options {
            command,
            db_path: tmp.path().join("passwords.db"),
            config: StoreConfig {
                kdf: KdfParams::new(64, 1, 1),
                keep_backup: false,
            },
            keyfile: None,
            check: IntegrityCheck::Enforce,
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let parsed = parse_options(&args(&["pwvault", "import", "old.csv", "--db", "/tmp/x.db", "--repair"])).unwrap();
        assert_eq!(parsed.command, Command::Import(PathBuf::from("old.csv")));
        assert_eq!(parsed.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(parsed.check, IntegrityCheck::Skip);

        let parsed = parse_options(&args(&["pwvault", "--db", "/tmp/x.db"])).unwrap();
        assert_eq!(parsed.command, Command::Audit);
        assert_eq!(parsed.check, IntegrityCheck::Enforce);

        assert!(parse_options(&args(&["pwvault", "import"])).is_err());
        assert!(parse_options(&args(&["pwvault", "frobnicate"])).is_err());
    }

    #[test]
    fn test_full_workflow() {
        let tmp = TempDir::new().unwrap();
        run(&options(&tmp, Command::Init), "master pw").unwrap();

        let csv = tmp.path().join("old.csv");
        std::fs::write(
            &csv,
            "website,password\ngithub.com,hunter2\nmail.com,Tr0ub4dor&3xyzzy!\ngithub.com,dupe\n",
        )
        .unwrap();
        let imported = run(&options(&tmp, Command::Import(csv)), "master pw").unwrap();
        let summary: serde_json::Value = serde_json::from_str(&imported).unwrap();
        assert_eq!(summary["added"], 2);
        assert_eq!(summary["skipped"], 1);

        let report = run(&options(&tmp, Command::Audit), "master pw").unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&report).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["website"], "github.com");

        // Audit results are persisted
        let db = Database::open(
            tmp.path().join("passwords.db"),
            Credentials::Password { password: "master pw", keyfile: None },
            options(&tmp, Command::List).config,
            IntegrityCheck::Enforce,
        )
        .unwrap();
        assert!(db.store().unwrap().records().iter().all(|r| r.security_rating.is_some()));

        let exported = run(&options(&tmp, Command::Export), "master pw").unwrap();
        assert!(exported.contains("hunter2"));
    }

    #[test]
    fn test_wrong_password() {
        let tmp = TempDir::new().unwrap();
        let opts = options(&tmp, Command::Init);
        let mut db = Database::create(&opts.db_path, "right", None, opts.config.clone()).unwrap();
        db.store_mut().unwrap().add(RecordDraft::new("a.com", "x"), Utc::now()).unwrap();
        db.save().unwrap();

        let err = run(&options(&tmp, Command::List), "wrong").unwrap_err();
        assert!(matches!(err.downcast_ref::<VaultError>(), Some(VaultError::IncorrectPassword)));
    }
}
