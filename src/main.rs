use anyhow::Context;
use clap::Parser;
use small_ftp::config::cli::Command;
use small_ftp::core::Storage;
use small_ftp::ftp::path;
use small_ftp::utils::error::{ErrorSeverity, FtpError};
use small_ftp::utils::{logger, validation::Validate};
use small_ftp::{CliConfig, FtpConfig, FtpTransfer, LocalStorage};
use serde::Serialize;
use tokio::net::TcpListener;

fn print_result<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> small_ftp::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

async fn run(cli: &CliConfig, transfer: &FtpTransfer<FtpConfig, LocalStorage>) -> anyhow::Result<()> {
    match &cli.command {
        Command::Upload {
            file,
            append_dir,
            name,
        } => {
            let receipt = transfer
                .upload_local_file(file, append_dir, name.as_deref())
                .await?;
            print_result(cli.json, &receipt, |r| {
                println!("✅ Uploaded {} -> {}", file, path::join_remote(&r.remote_dir, &r.file_name));
                println!("   {} bytes, md5 {}", r.bytes, r.md5);
            })?;
        }
        Command::UploadDir {
            local_dir,
            append_dir,
            ..
        } => {
            let report = transfer.upload_dir(append_dir, local_dir).await?;
            print_result(cli.json, &report, |r| {
                println!(
                    "✅ Uploaded {} files ({} bytes) to {}",
                    r.uploaded.len(),
                    r.total_bytes(),
                    r.remote_dir
                );
                for failure in &r.failed {
                    println!("❌ {}: {}", failure.local_path, failure.reason);
                }
            })?;
            if !report.is_complete() {
                std::process::exit(2);
            }
        }
        Command::Download {
            remote_name,
            local_name,
        } => {
            let local_name = local_name.as_deref().unwrap_or(remote_name);
            let receipt = transfer.download_to_local(remote_name, local_name).await?;
            print_result(cli.json, &receipt, |r| {
                println!("✅ Downloaded {} -> {}", r.remote_path, r.destination);
                println!("   {} bytes, md5 {}", r.bytes, r.md5);
            })?;
        }
        Command::Base64 {
            remote_name,
            output,
        } => {
            let encoded = transfer.read_to_base64(remote_name).await?;
            match output {
                Some(path) => {
                    let storage = transfer.storage();
                    storage.write_file(path, encoded.as_bytes()).await?;
                    println!("📁 Base64 saved to: {}", storage.resolve(path).display());
                }
                None => println!("{}", encoded),
            }
        }
        Command::Ls { dir } => {
            let names = transfer.list_remote(dir.as_deref()).await?;
            print_result(cli.json, &names, |names| {
                for name in names {
                    println!("{}", name);
                }
            })?;
        }
        Command::Serve { bind } => {
            let listener = TcpListener::bind(bind.as_str())
                .await
                .with_context(|| format!("bind {}", bind))?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("listen for ctrl-c failed ------->>> {}", e);
                }
            };
            small_ftp::core::http::serve(listener, transfer, shutdown).await?;
        }
    }
    Ok(())
}

fn exit_code(severity: ErrorSeverity) -> i32 {
    match severity {
        ErrorSeverity::Low => 0,      // 警告，但成功
        ErrorSeverity::Medium => 2,   // 可重試
        ErrorSeverity::High => 1,     // 處理錯誤
        ErrorSeverity::Critical => 3, // 設定或系統錯誤
    }
}

fn report_error(e: &FtpError) {
    tracing::error!(
        "❌ small-ftp failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 建議: {}", e.recovery_suggestion());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    let (verbose, json_log) = cli.logging();
    if json_log {
        logger::init_json_logger(verbose);
    } else {
        logger::init_cli_logger(verbose);
    }

    tracing::info!("Starting small-ftp CLI");

    // 載入並驗證配置
    let config = match cli.resolve().and_then(|c| c.validate().map(|_| c)) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            report_error(&e);
            std::process::exit(exit_code(e.severity()));
        }
    };
    tracing::debug!("FTP config: {:?}", config);

    let storage = LocalStorage::new(config.local_dir.clone());
    let transfer = FtpTransfer::new(config, storage);

    if let Err(e) = run(&cli, &transfer).await {
        match e.downcast_ref::<FtpError>() {
            Some(ftp_error) => {
                report_error(ftp_error);
                let code = exit_code(ftp_error.severity());
                if code > 0 {
                    std::process::exit(code);
                }
            }
            None => {
                tracing::error!("❌ small-ftp failed: {:#}", e);
                eprintln!("❌ {:#}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
