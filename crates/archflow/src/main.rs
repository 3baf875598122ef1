mod args;
mod commands;
mod outputs;

use archflow_build::BuildError;
use archflow_config::ConfigError;
use archflow_core::{Arch, CoreError};
use args::{CommonArgs, MultiarchArgs, parse_arch};
use clap::{Parser, Subcommand};
use colored::Colorize;

#[derive(Parser)]
#[command(name = "archflow")]
#[command(
    about = "ARM64 / AMD64 のイメージを並列ビルドし、マルチアーキテクチャのマニフェストにまとめる",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 単一アーキテクチャのイメージをビルド
    Build {
        /// アーキテクチャ (arm64, amd64)
        #[arg(value_parser = parse_arch)]
        arch: Arch,
        #[command(flatten)]
        common: CommonArgs,
        /// ビルドを実行する Docker ホスト（DOCKER_HOST）
        #[arg(long)]
        docker_host: Option<String>,
    },
    /// ARM64 と AMD64 を並列ビルドしてマニフェストリストを作成
    Multiarch {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        multiarch: MultiarchArgs,
    },
    /// 解決済みのビルドプランを表示（ビルドは行わない）
    Resolve {
        /// 単一アーキテクチャのプランを表示（省略時は multiarch）
        #[arg(long, value_parser = parse_arch)]
        arch: Option<Arch>,
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        multiarch: MultiarchArgs,
    },
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // stdout はステップ出力に使うので、ログは stderr に出力
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(cli).await {
        eprintln!();
        eprintln!("{}", "✗ archflow が失敗しました".red().bold());
        eprintln!();
        eprintln!("{}", user_message(&err));
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build {
            arch,
            common,
            docker_host,
        } => commands::build::handle(arch, &common, docker_host).await,
        Commands::Multiarch { common, multiarch } => {
            commands::multiarch::handle(&common, &multiarch).await
        }
        Commands::Resolve {
            arch,
            common,
            multiarch,
        } => commands::resolve::handle(arch, &common, &multiarch),
        Commands::Version => {
            println!("archflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// エラーの種類に応じた終了コード
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<BuildError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<CoreError>().is_some() || err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}

fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<BuildError>() {
        Some(e) => e.user_message(),
        None => format!("{:#}", err),
    }
}
