//! docker CLI の起動ヘルパー

use crate::error::{BuildError, BuildResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// 実行する docker CLI
///
/// 通常は PATH 上の `docker`。
#[derive(Debug, Clone)]
pub struct DockerProgram {
    path: PathBuf,
}

impl Default for DockerProgram {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerProgram {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `docker` コマンドを組み立てる
    ///
    /// `docker_host` を指定すると DOCKER_HOST として渡す。
    /// タスクがキャンセルされた場合は子プロセスも終了させる。
    pub fn command(&self, docker_host: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.path);
        if let Some(host) = docker_host {
            cmd.env("DOCKER_HOST", host);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// コマンドを実行して出力を返す（終了コードは呼び出し側で判定する）
    pub async fn run<I, S>(&self, docker_host: Option<&str>, args: I) -> BuildResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(docker_host);
        cmd.args(args);
        tracing::debug!("Running: {:?}", cmd.as_std());
        cmd.output().await.map_err(spawn_error)
    }

    /// stdin にデータを渡してコマンドを実行
    pub async fn run_with_stdin<I, S>(
        &self,
        docker_host: Option<&str>,
        args: I,
        input: &[u8],
    ) -> BuildResult<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command(docker_host);
        cmd.args(args).stdin(Stdio::piped());
        tracing::debug!("Running: {:?}", cmd.as_std());

        let mut child = cmd.spawn().map_err(spawn_error)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            // stdin を閉じて EOF を通知
            drop(stdin);
        }

        Ok(child.wait_with_output().await?)
    }
}

pub(crate) fn spawn_error(e: std::io::Error) -> BuildError {
    if e.kind() == std::io::ErrorKind::NotFound {
        BuildError::DockerCliNotFound
    } else {
        BuildError::Io(e)
    }
}

/// stderr の末尾 `lines` 行を取り出す
pub fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
