use crate::command::{DockerProgram, spawn_error};
use crate::dispatch::connect_docker;
use crate::error::{BuildError, BuildResult};
use crate::progress::BuildProgress;
use archflow_core::{Arch, BuildOutput, BuildRequest};
use serde::Deserialize;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// 失敗時にエラーメッセージへ含める stderr の行数
const ERROR_TAIL_LINES: usize = 20;

/// `docker buildx build --metadata-file` の出力
#[derive(Debug, Default, Deserialize)]
pub struct BuildMetadata {
    /// プッシュされたイメージ（マニフェスト）のダイジェスト
    #[serde(rename = "containerimage.digest")]
    pub image_digest: Option<String>,
    /// イメージ設定のダイジェスト（ローカルのイメージIDと一致する）
    #[serde(rename = "containerimage.config.digest")]
    pub config_digest: Option<String>,
}

impl BuildMetadata {
    pub fn from_slice(bytes: &[u8]) -> BuildResult<Self> {
        // buildx が何も書かなかった場合は空のメタデータとして扱う
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// docker buildx を使用したアーキテクチャ別ビルド
#[derive(Debug, Default, Clone)]
pub struct ImageBuilder {
    docker: DockerProgram,
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(docker: DockerProgram) -> Self {
        Self { docker }
    }

    /// `docker buildx build` の引数を組み立てる
    pub fn buildx_args(request: &BuildRequest, metadata_file: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "buildx".into(),
            "build".into(),
            "--platform".into(),
            request.arch.platform().into(),
            "--progress".into(),
            "plain".into(),
            "-f".into(),
            request.params.dockerfile_path.clone().into(),
        ];

        for reference in request.references() {
            args.push("-t".into());
            args.push(reference.into());
        }

        // ビルド引数はそのまま渡す（不正な形式は buildx 側でエラーになる）
        for entry in &request.params.build_args {
            args.push("--build-arg".into());
            args.push(entry.into());
        }

        // ターゲットステージ
        if let Some(target) = &request.target {
            args.push("--target".into());
            args.push(target.into());
        }

        // キャッシュなし
        if request.no_cache {
            args.push("--no-cache".into());
        }

        // プッシュしない場合はローカルにロード（レジストリには書き込まない）
        // プッシュ時は attestation を付けない。付けるとアーキテクチャ別の
        // ダイジェストがイメージではなくインデックスを指す
        if request.push {
            args.push("--push".into());
            args.push("--provenance=false".into());
            args.push("--sbom=false".into());
        } else {
            args.push("--load".into());
        }

        args.push("--metadata-file".into());
        args.push(metadata_file.into());

        // コンテキストパス
        args.push(request.params.context.clone().into());

        args
    }

    /// イメージをビルド
    pub async fn build(
        &self,
        request: &BuildRequest,
        progress: &BuildProgress,
    ) -> BuildResult<BuildOutput> {
        let image_tag = request.primary_reference();
        tracing::info!(arch = %request.arch, "Building image: {}", image_tag);

        let metadata_file = tempfile::Builder::new()
            .prefix("archflow-metadata-")
            .suffix(".json")
            .tempfile()?;

        let mut cmd = self.docker.command(request.docker_host.as_deref());
        cmd.args(Self::buildx_args(request, metadata_file.path()))
            .stdout(Stdio::null());
        tracing::debug!("Build command: {:?}", cmd.as_std());

        let mut child = cmd.spawn().map_err(spawn_error)?;

        // buildx の進捗は stderr に出力される
        let mut tail: VecDeque<String> = VecDeque::with_capacity(ERROR_TAIL_LINES);
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            while let Some(line) = read_line_lossy(&mut reader).await? {
                tracing::debug!(arch = %request.arch, "{}", line);
                progress.set_message(line.trim());
                if tail.len() == ERROR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(BuildError::BuildFailed {
                arch: request.arch,
                code: status.code(),
                message: Vec::from(tail).join("\n"),
            });
        }

        let metadata = BuildMetadata::from_slice(&tokio::fs::read(metadata_file.path()).await?)?;
        let digest = if request.push {
            metadata
                .image_digest
                .ok_or(BuildError::DigestUnavailable(request.arch))?
        } else {
            self.local_digest(request, &image_tag, metadata.config_digest)
                .await?
        };

        tracing::info!(arch = %request.arch, "Successfully built: {} ({})", image_tag, digest);
        Ok(BuildOutput::new(Some(request.arch), image_tag, digest))
    }

    /// ローカルにロードしたイメージのIDを取得
    async fn local_digest(
        &self,
        request: &BuildRequest,
        image_tag: &str,
        fallback: Option<String>,
    ) -> BuildResult<String> {
        match self.inspect_image_id(request.docker_host.as_deref(), image_tag).await {
            Ok(Some(id)) => Ok(id),
            Ok(None) => fallback.ok_or(BuildError::DigestUnavailable(request.arch)),
            Err(e) => {
                tracing::debug!("Image inspection failed for {}: {}", image_tag, e);
                fallback.ok_or_else(|| missing_local_digest(request.arch, e))
            }
        }
    }

    /// イメージの存在確認とIDの取得
    pub async fn inspect_image_id(
        &self,
        docker_host: Option<&str>,
        image_tag: &str,
    ) -> BuildResult<Option<String>> {
        let docker = connect_docker(docker_host)?;
        match docker.inspect_image(image_tag).await {
            Ok(image) => Ok(image.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                ..
            }) => Ok(None),
            Err(e) => Err(BuildError::DockerConnection(e)),
        }
    }
}

/// 1行読み込む（UTF-8 でないバイトは置換文字にする）
///
/// `RUN` の出力はそのまま流れてくるので、エンコーディングは保証されない。
async fn read_line_lossy<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

fn missing_local_digest(arch: Arch, cause: BuildError) -> BuildError {
    tracing::warn!("Could not determine local image digest for {}: {}", arch, cause);
    BuildError::DigestUnavailable(arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archflow_core::{BuildInputs, BuildPlan};
    use std::path::PathBuf;

    fn request(push: bool) -> BuildRequest {
        let mut inputs = BuildInputs {
            image_name: Some("acme/app".to_string()),
            build_args: Some("VERSION=1.0,BROKEN".to_string()),
            tags: vec!["latest".to_string(), "v1".to_string()],
            target: Some("runtime".to_string()),
            push: Some(push),
            ..Default::default()
        };
        inputs.arm.dockerfile_path = Some("./Dockerfile.arm64".to_string());

        BuildPlan::multiarch(&inputs)
            .unwrap()
            .request_for(Arch::Arm64)
            .unwrap()
            .clone()
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_buildx_args_local_load() {
        let args = as_strings(ImageBuilder::buildx_args(
            &request(false),
            &PathBuf::from("/tmp/meta.json"),
        ));

        assert_eq!(
            &args[..8],
            &[
                "buildx",
                "build",
                "--platform",
                "linux/arm64",
                "--progress",
                "plain",
                "-f",
                "./Dockerfile.arm64"
            ]
        );
        assert!(args.windows(2).any(|w| w == ["-t", "acme/app:latest-arm64"]));
        assert!(args.windows(2).any(|w| w == ["-t", "acme/app:v1-arm64"]));
        assert!(args.windows(2).any(|w| w == ["--build-arg", "VERSION=1.0"]));
        // 不正なエントリも書き換えずに渡す
        assert!(args.windows(2).any(|w| w == ["--build-arg", "BROKEN"]));
        assert!(args.windows(2).any(|w| w == ["--target", "runtime"]));
        assert!(args.contains(&"--load".to_string()));
        assert!(!args.contains(&"--push".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--provenance")));
        assert!(args.windows(2).any(|w| w == ["--metadata-file", "/tmp/meta.json"]));
        assert_eq!(args.last().map(String::as_str), Some("."));
    }

    #[test]
    fn test_buildx_args_push() {
        let args = as_strings(ImageBuilder::buildx_args(
            &request(true),
            &PathBuf::from("/tmp/meta.json"),
        ));

        assert!(args.contains(&"--push".to_string()));
        assert!(!args.contains(&"--load".to_string()));
        assert!(!args.contains(&"--no-cache".to_string()));
        // アーキテクチャ別のダイジェストがイメージ本体を指すように
        assert!(args.contains(&"--provenance=false".to_string()));
        assert!(args.contains(&"--sbom=false".to_string()));
    }

    #[tokio::test]
    async fn test_read_line_lossy() {
        let mut reader = &b"caf\xe9 au lait\r\nok\nlast"[..];
        assert_eq!(
            read_line_lossy(&mut reader).await.unwrap().as_deref(),
            Some("caf\u{fffd} au lait")
        );
        assert_eq!(read_line_lossy(&mut reader).await.unwrap().as_deref(), Some("ok"));
        assert_eq!(read_line_lossy(&mut reader).await.unwrap().as_deref(), Some("last"));
        assert_eq!(read_line_lossy(&mut reader).await.unwrap(), None);
    }

    #[test]
    fn test_parse_metadata() {
        let json = br#"{
            "buildx.build.ref": "builder/builder0/abc",
            "containerimage.config.digest": "sha256:config",
            "containerimage.digest": "sha256:image"
        }"#;

        let metadata = BuildMetadata::from_slice(json).unwrap();
        assert_eq!(metadata.image_digest.as_deref(), Some("sha256:image"));
        assert_eq!(metadata.config_digest.as_deref(), Some("sha256:config"));
    }

    #[test]
    fn test_parse_empty_metadata() {
        let metadata = BuildMetadata::from_slice(b"  \n").unwrap();
        assert!(metadata.image_digest.is_none());
        assert!(BuildMetadata::from_slice(b"{not json").is_err());
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::fake_docker::FakeDocker;
        use serial_test::serial;

        #[tokio::test]
        #[serial]
        async fn test_build_push_returns_metadata_digest() {
            let docker = FakeDocker::new();
            docker.set_metadata(
                r#"{"containerimage.digest": "sha256:pushed", "containerimage.config.digest": "sha256:config"}"#,
            );

            let output = ImageBuilder::with_program(docker.program())
                .build(&request(true), &BuildProgress::hidden())
                .await
                .unwrap();

            assert_eq!(output.arch, Some(Arch::Arm64));
            assert_eq!(output.image_tag, "acme/app:latest-arm64");
            assert_eq!(output.digest, "sha256:pushed");

            let calls = docker.calls();
            assert_eq!(calls.len(), 1);
            assert!(calls[0].starts_with("buildx build --platform linux/arm64"));
            assert!(calls[0].contains("--push --provenance=false --sbom=false"));
        }

        #[tokio::test]
        #[serial]
        async fn test_build_push_without_digest() {
            let docker = FakeDocker::new();
            docker.set_metadata("{}");

            let err = ImageBuilder::with_program(docker.program())
                .build(&request(true), &BuildProgress::hidden())
                .await
                .unwrap_err();
            assert!(matches!(err, BuildError::DigestUnavailable(Arch::Arm64)));
        }

        #[tokio::test]
        #[serial]
        async fn test_build_failure_keeps_exit_code() {
            let docker = FakeDocker::new();
            docker.fail("build", 17);

            let err = ImageBuilder::with_program(docker.program())
                .build(&request(true), &BuildProgress::hidden())
                .await
                .unwrap_err();

            match err {
                BuildError::BuildFailed {
                    arch,
                    code,
                    message,
                } => {
                    assert_eq!(arch, Arch::Arm64);
                    assert_eq!(code, Some(17));
                    assert!(message.contains("did not complete successfully"));
                    // UTF-8 でない出力行も置換文字で残る
                    assert!(message.contains("caf\u{fffd} au lait"));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        #[serial]
        async fn test_build_load_falls_back_to_config_digest() {
            let docker = FakeDocker::new();
            docker.set_metadata(r#"{"containerimage.config.digest": "sha256:config"}"#);

            let mut request = request(false);
            request.docker_host = Some("unix:///nonexistent/archflow.sock".to_string());

            let output = ImageBuilder::with_program(docker.program())
                .build(&request, &BuildProgress::hidden())
                .await
                .unwrap();

            assert_eq!(output.digest, "sha256:config");
            assert_eq!(docker.last_host(), "unix:///nonexistent/archflow.sock");
            let calls = docker.calls();
            assert!(calls[0].contains("--load"));
            assert!(!calls[0].contains("--push"));
        }
    }

    #[tokio::test]
    #[serial_test::serial]
    #[ignore] // Docker接続が必要なため、通常のテストではスキップ
    async fn test_build_simple_image() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("Dockerfile"),
            "FROM alpine:latest\nCMD echo 'test'",
        )
        .unwrap();

        let inputs = BuildInputs {
            image_name: Some("archflow-test".to_string()),
            context: Some(temp_dir.path().display().to_string()),
            dockerfile_path: Some(temp_dir.path().join("Dockerfile").display().to_string()),
            ..Default::default()
        };
        let plan = BuildPlan::single(&inputs, Arch::Amd64).unwrap();

        let output = ImageBuilder::new()
            .build(&plan.requests[0], &BuildProgress::hidden())
            .await
            .unwrap();

        assert_eq!(output.image_tag, "archflow-test:latest");
        assert!(output.digest.starts_with("sha256:"));
    }
}
