//! `pkd`: run trust material through the pipeline, or verify an SOD.

#![deny(unsafe_code)]

use clap::{Parser, Subcommand, ValueEnum};
use directory::{Directory, DitConfig, InMemoryDirectory, LdapDirectory, LdapSettings};
use passive_auth::Verifier;
use pipeline::{PipelineConfig, PipelineService, UploadRequest};
use pkd_core::{PauseStep, ProcessingMode, UploadId, UploadStatus};
use pki::anchors::TrustAnchors;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::{InMemoryStore, Store};

#[derive(Parser, Debug)]
#[command(name = "pkd", about = "Local ICAO PKD processing and verification")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Auto,
    Manual,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest an LDIF or master list file and print the upload report
    Process {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, value_enum, default_value = "auto")]
        mode: Mode,
        /// LDAP server; omitted means an in-process directory
        #[arg(long)]
        ldap_url: Option<String>,
        #[arg(long, default_value = "dc=ldap,dc=smartcoreinc,dc=com")]
        base_dn: String,
        /// Directory of DER trust anchors for master list signers
        #[arg(long)]
        anchors: Option<PathBuf>,
        /// Echo progress updates to stderr
        #[arg(long, default_value_t = false)]
        show_progress: bool,
    },
    /// Verify an ePassport SOD against the directory
    Verify {
        #[arg(long)]
        sod: PathBuf,
        /// Data group as N=path (e.g. `--dg 1=dg1.bin`), repeatable
        #[arg(long = "dg")]
        dgs: Vec<String>,
        #[arg(long)]
        ldap_url: Option<String>,
        #[arg(long, default_value = "dc=ldap,dc=smartcoreinc,dc=com")]
        base_dn: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    progress::init_json_logging();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Process { file, mode, ldap_url, base_dn, anchors, show_progress } => {
            let anchors = load_anchors(anchors.as_deref())?;
            match ldap_url {
                Some(url) => {
                    let dir = Arc::new(LdapDirectory::connect(ldap_settings(url)).await?);
                    cmd_process(dir, &base_dn, anchors, &file, mode, show_progress).await
                }
                None => {
                    let dir = Arc::new(InMemoryDirectory::new());
                    cmd_process(dir, &base_dn, anchors, &file, mode, show_progress).await
                }
            }
        }
        Command::Verify { sod, dgs, ldap_url, base_dn } => match ldap_url {
            Some(url) => {
                let dir = Arc::new(LdapDirectory::connect(ldap_settings(url)).await?);
                cmd_verify(dir, &base_dn, &sod, &dgs).await
            }
            None => {
                let dir = Arc::new(InMemoryDirectory::new());
                cmd_verify(dir, &base_dn, &sod, &dgs).await
            }
        },
    }
}

fn ldap_settings(url: String) -> LdapSettings {
    LdapSettings {
        url,
        bind_dn: std::env::var("PKD_LDAP_BIND_DN").ok(),
        bind_password: std::env::var("PKD_LDAP_PASSWORD").ok(),
        ..LdapSettings::default()
    }
}

fn load_anchors(dir: Option<&std::path::Path>) -> Result<TrustAnchors, std::io::Error> {
    match dir {
        None => Ok(TrustAnchors::empty()),
        Some(path) => {
            let (bundle, skipped) = TrustAnchors::load_dir(path)?;
            if skipped > 0 {
                eprintln!("warning: {skipped} anchor file(s) did not decode");
            }
            Ok(bundle)
        }
    }
}

async fn cmd_process<D: Directory>(
    dir: Arc<D>,
    base_dn: &str,
    anchors: TrustAnchors,
    file: &PathBuf,
    mode: Mode,
    show_progress: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new());
    let (svc, stream) = PipelineService::new(
        store.clone(),
        dir,
        DitConfig::new(base_dn),
        anchors,
        PipelineConfig::from_env(),
    );
    let _dispatcher = svc.start(stream);

    if show_progress {
        let mut updates = svc.progress().subscribe_all();
        tokio::spawn(async move {
            while let Ok(update) = updates.recv().await {
                eprintln!(
                    "[{:>3}%] {:?}: {}",
                    update.percentage, update.stage, update.message
                );
            }
        });
    }

    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let bytes = std::fs::read(file)?;
    let receipt = svc
        .upload(UploadRequest {
            file_name,
            bytes,
            expected_checksum: None,
            mode: match mode {
                Mode::Auto => ProcessingMode::Auto,
                Mode::Manual => ProcessingMode::Manual,
            },
            force_override: false,
        })
        .await?;
    let id = receipt.upload_id;

    match mode {
        Mode::Auto => wait_terminal(&svc, id).await?,
        Mode::Manual => {
            wait_pause(&svc, id, PauseStep::UploadCompleted).await?;
            pause_prompt("parse")?;
            svc.run_parse(id).await?;
            wait_pause(&svc, id, PauseStep::ParsingCompleted).await?;
            pause_prompt("validate")?;
            svc.run_validation(id).await?;
            pause_prompt("upload to LDAP")?;
            svc.run_publication(id).await?;
        }
    }

    let view = svc.status(id).ok_or("upload record vanished after the pipeline completed")?;
    let rows: Vec<_> = store
        .certificates_for_upload(id)
        .into_iter()
        .map(|c| {
            serde_json::json!({
                "kind": c.kind,
                "subject": c.subject_dn,
                "serial": c.serial_hex,
                "country": c.subject_country,
                "status": c.validation,
                "errors": c.errors,
                "published": c.uploaded_to_ldap,
            })
        })
        .collect();
    let report = serde_json::json!({ "upload": view, "certificates": rows });
    println!("{}", serde_json::to_string_pretty(&report)?);

    if view.status == UploadStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

type Svc<D> = PipelineService<InMemoryStore, D>;

async fn wait_terminal<D: Directory>(
    svc: &Svc<D>,
    id: UploadId,
) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..12_000 {
        if let Some(view) = svc.status(id) {
            if matches!(view.status, UploadStatus::Completed | UploadStatus::Failed) {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err("pipeline did not finish within the deadline".into())
}

async fn wait_pause<D: Directory>(
    svc: &Svc<D>,
    id: UploadId,
    step: PauseStep,
) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..1_200 {
        match svc.status(id) {
            Some(view) if view.status == UploadStatus::Failed => {
                return Err(view.failure_message.unwrap_or_else(|| "failed".into()).into());
            }
            Some(view) if view.paused_at_step == Some(step) => return Ok(()),
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    Err("upload did not reach the expected pause".into())
}

fn pause_prompt(next: &str) -> Result<(), std::io::Error> {
    eprintln!("Press Enter to {next}...");
    let mut buf = String::new();
    std::io::stdin().read_line(&mut buf)?;
    Ok(())
}

async fn cmd_verify<D: Directory>(
    dir: Arc<D>,
    base_dn: &str,
    sod: &PathBuf,
    dg_specs: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let verifier = Verifier::new(dir, DitConfig::new(base_dn));
    let sod_der = std::fs::read(sod)?;
    let mut dgs = BTreeMap::new();
    for spec in dg_specs {
        let (number, path) = parse_dg_spec(spec)?;
        dgs.insert(number, std::fs::read(path)?);
    }
    let response = verifier.verify_decoded(&sod_der, &dgs).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.status != passive_auth::PaStatus::Valid {
        std::process::exit(1);
    }
    Ok(())
}

/// `N=path` with N in 1..=16.
fn parse_dg_spec(spec: &str) -> Result<(u8, PathBuf), String> {
    let (number, path) = spec
        .split_once('=')
        .ok_or_else(|| format!("--dg expects N=path, got {spec}"))?;
    let number: u8 = number
        .trim()
        .parse()
        .map_err(|_| format!("--dg number must be an integer, got {number}"))?;
    if !(1..=16).contains(&number) {
        return Err(format!("--dg number must be 1..=16, got {number}"));
    }
    Ok((number, PathBuf::from(path)))
}
