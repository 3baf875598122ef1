//! マルチアーキテクチャのマニフェストリスト作成

use crate::command::{DockerProgram, stderr_tail};
use crate::error::{BuildError, BuildResult};
use archflow_core::{Arch, BuildOutput, BuildPlan};
use serde::Deserialize;

/// マニフェストリストに含めるアーキテクチャ別イメージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSource {
    pub arch: Arch,
    pub digest: String,
}

/// マニフェストリストの作成リクエスト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRequest {
    pub repository: String,
    /// マニフェストリストに付けるタグ（アーキテクチャのサフィックスなし）
    pub tags: Vec<String>,
    pub sources: Vec<ManifestSource>,
}

impl ManifestRequest {
    /// 今回のビルド結果からリクエストを作成
    ///
    /// 計画されたすべてのアーキテクチャにダイジェストが揃っていなければならない。
    /// 以前の実行で残ったイメージを混ぜないよう、ソースはダイジェストのみで参照する。
    pub fn from_outputs(plan: &BuildPlan, outputs: &[BuildOutput]) -> BuildResult<Self> {
        let mut sources = Vec::with_capacity(plan.requests.len());

        for arch in plan.archs() {
            let output = outputs
                .iter()
                .find(|o| o.arch == Some(arch) && o.has_digest())
                .ok_or(BuildError::DigestUnavailable(arch))?;
            sources.push(ManifestSource {
                arch,
                digest: output.digest.trim().to_string(),
            });
        }

        if let Some(extra) = outputs
            .iter()
            .filter_map(|o| o.arch)
            .find(|arch| !plan.archs().contains(arch))
        {
            return Err(BuildError::ManifestFailed(format!(
                "output for unplanned architecture {}",
                extra
            )));
        }

        Ok(Self {
            repository: plan.repository.clone(),
            tags: plan.tags.clone(),
            sources,
        })
    }

    /// `repository@digest` 形式のソース参照
    pub fn source_references(&self) -> Vec<String> {
        self.sources
            .iter()
            .map(|s| format!("{}@{}", self.repository, s.digest))
            .collect()
    }

    /// `repository:tag` 形式のタグ参照
    pub fn tag_references(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|tag| format!("{}:{}", self.repository, tag))
            .collect()
    }

    pub fn primary_reference(&self) -> String {
        self.tag_references().into_iter().next().unwrap_or_default()
    }
}

/// `imagetools inspect --format '{{json .Manifest}}'` の出力
#[derive(Debug, Default, Deserialize)]
pub struct ManifestIndex {
    pub digest: Option<String>,
    #[serde(default)]
    pub manifests: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestEntry {
    pub digest: String,
}

impl ManifestIndex {
    pub fn from_slice(json: &[u8]) -> BuildResult<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    /// インデックス自身のダイジェスト
    pub fn index_digest(&self) -> BuildResult<String> {
        self.digest
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                BuildError::ManifestFailed(
                    "manifest digest missing from inspect output".to_string(),
                )
            })
    }

    pub fn contains(&self, digest: &str) -> bool {
        self.manifests.iter().any(|m| m.digest == digest)
    }

    /// `source` の子マニフェストがすべてこのリストに含まれているか
    ///
    /// インデックスとしてプッシュされたソースは `imagetools create` で展開されるため、
    /// ソース自身のダイジェストではなく子マニフェストで照合する。
    pub fn covers(&self, source: &ManifestIndex) -> bool {
        !source.manifests.is_empty()
            && source
                .manifests
                .iter()
                .all(|m| self.contains(&m.digest))
    }
}

/// `docker buildx imagetools` によるマニフェストリストのプッシュ
#[derive(Debug, Default, Clone)]
pub struct ManifestPusher {
    docker: DockerProgram,
}

impl ManifestPusher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(docker: DockerProgram) -> Self {
        Self { docker }
    }

    pub fn create_args(manifest: &ManifestRequest) -> Vec<String> {
        let mut args = vec![
            "buildx".to_string(),
            "imagetools".to_string(),
            "create".to_string(),
        ];
        for reference in manifest.tag_references() {
            args.push("-t".to_string());
            args.push(reference);
        }
        args.extend(manifest.source_references());
        args
    }

    pub fn inspect_args(reference: &str) -> Vec<String> {
        vec![
            "buildx".to_string(),
            "imagetools".to_string(),
            "inspect".to_string(),
            reference.to_string(),
            "--format".to_string(),
            "{{json .Manifest}}".to_string(),
        ]
    }

    /// マニフェストリストを作成してプッシュし、そのダイジェストを返す
    pub async fn push(&self, manifest: &ManifestRequest) -> BuildResult<BuildOutput> {
        if manifest.tags.is_empty() || manifest.sources.is_empty() {
            return Err(BuildError::ManifestFailed(
                "manifest list needs at least one tag and one source".to_string(),
            ));
        }

        let primary = manifest.primary_reference();
        tracing::info!(
            "Creating manifest list {} from {} image(s)",
            primary,
            manifest.sources.len()
        );

        let output = self.docker.run(None, Self::create_args(manifest)).await?;
        if !output.status.success() {
            return Err(BuildError::ManifestFailed(stderr_tail(&output.stderr, 10)));
        }

        let list = self.inspect(&primary).await?;
        let digest = list.index_digest()?;

        for source in &manifest.sources {
            if list.contains(&source.digest) {
                continue;
            }

            let reference = format!("{}@{}", manifest.repository, source.digest);
            let source_index = self.inspect(&reference).await?;
            if !list.covers(&source_index) {
                return Err(BuildError::ManifestFailed(format!(
                    "manifest list {} does not reference {} image {}",
                    digest, source.arch, source.digest
                )));
            }
            tracing::debug!(
                "{} image {} is referenced through its child manifests",
                source.arch,
                source.digest
            );
        }

        tracing::info!("Pushed manifest list {} ({})", primary, digest);
        Ok(BuildOutput::new(None, primary, digest))
    }

    async fn inspect(&self, reference: &str) -> BuildResult<ManifestIndex> {
        let output = self.docker.run(None, Self::inspect_args(reference)).await?;
        if !output.status.success() {
            return Err(BuildError::ManifestFailed(format!(
                "could not inspect {}: {}",
                reference,
                stderr_tail(&output.stderr, 10)
            )));
        }
        ManifestIndex::from_slice(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archflow_core::BuildInputs;

    fn plan() -> BuildPlan {
        let inputs = BuildInputs {
            image_name: Some("ghcr.io/acme/app".to_string()),
            tags: vec!["latest".to_string(), "v1".to_string()],
            push: Some(true),
            ..Default::default()
        };
        BuildPlan::multiarch(&inputs).unwrap()
    }

    fn output(arch: Arch, digest: &str) -> BuildOutput {
        BuildOutput::new(Some(arch), format!("ghcr.io/acme/app:latest-{}", arch), digest)
    }

    fn sources() -> Vec<ManifestSource> {
        vec![
            ManifestSource {
                arch: Arch::Amd64,
                digest: "sha256:aaa".to_string(),
            },
            ManifestSource {
                arch: Arch::Arm64,
                digest: "sha256:bbb".to_string(),
            },
        ]
    }

    #[test]
    fn test_from_outputs_uses_run_digests() {
        let outputs = vec![
            output(Arch::Arm64, "sha256:bbb"),
            output(Arch::Amd64, "sha256:aaa"),
        ];
        let manifest = ManifestRequest::from_outputs(&plan(), &outputs).unwrap();

        // プラン順に並ぶ
        assert_eq!(manifest.sources, sources());
        assert_eq!(
            manifest.source_references(),
            vec!["ghcr.io/acme/app@sha256:aaa", "ghcr.io/acme/app@sha256:bbb"]
        );
        assert_eq!(
            manifest.tag_references(),
            vec!["ghcr.io/acme/app:latest", "ghcr.io/acme/app:v1"]
        );
    }

    #[test]
    fn test_from_outputs_missing_arch() {
        let outputs = vec![output(Arch::Amd64, "sha256:aaa")];
        let err = ManifestRequest::from_outputs(&plan(), &outputs).unwrap_err();
        assert!(matches!(err, BuildError::DigestUnavailable(Arch::Arm64)));
    }

    #[test]
    fn test_from_outputs_empty_digest() {
        let outputs = vec![output(Arch::Amd64, "sha256:aaa"), output(Arch::Arm64, " ")];
        let err = ManifestRequest::from_outputs(&plan(), &outputs).unwrap_err();
        assert!(matches!(err, BuildError::DigestUnavailable(Arch::Arm64)));
    }

    #[test]
    fn test_create_args() {
        let manifest = ManifestRequest {
            repository: "acme/app".to_string(),
            tags: vec!["latest".to_string()],
            sources: sources(),
        };

        assert_eq!(
            ManifestPusher::create_args(&manifest),
            vec![
                "buildx",
                "imagetools",
                "create",
                "-t",
                "acme/app:latest",
                "acme/app@sha256:aaa",
                "acme/app@sha256:bbb"
            ]
        );
    }

    #[test]
    fn test_manifest_index_digest() {
        let json = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "digest": "sha256:index",
            "size": 743,
            "manifests": [
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:aaa", "size": 1, "platform": {"architecture": "amd64", "os": "linux"}},
                {"mediaType": "application/vnd.oci.image.manifest.v1+json", "digest": "sha256:bbb", "size": 1, "platform": {"architecture": "arm64", "os": "linux"}}
            ]
        }"#;

        let list = ManifestIndex::from_slice(json).unwrap();
        assert_eq!(list.index_digest().unwrap(), "sha256:index");
        assert!(list.contains("sha256:aaa"));
        assert!(list.contains("sha256:bbb"));
        assert!(!list.contains("sha256:old"));

        let no_digest = ManifestIndex::from_slice(br#"{"manifests": []}"#).unwrap();
        assert!(no_digest.index_digest().is_err());
    }

    #[test]
    fn test_manifest_index_covers_flattened_source() {
        // attestation 付きでプッシュされたソースは子マニフェストに展開される
        let list = ManifestIndex::from_slice(
            br#"{"digest": "sha256:index", "manifests": [
                {"digest": "sha256:amd-image", "platform": {"architecture": "amd64", "os": "linux"}},
                {"digest": "sha256:amd-attest", "platform": {"architecture": "unknown", "os": "unknown"}},
                {"digest": "sha256:bbb", "platform": {"architecture": "arm64", "os": "linux"}}
            ]}"#,
        )
        .unwrap();
        let source = ManifestIndex::from_slice(
            br#"{"mediaType": "application/vnd.oci.image.index.v1+json", "manifests": [
                {"digest": "sha256:amd-image"},
                {"digest": "sha256:amd-attest"}
            ]}"#,
        )
        .unwrap();
        assert!(list.covers(&source));

        let stale = ManifestIndex::from_slice(
            br#"{"manifests": [{"digest": "sha256:amd-image"}, {"digest": "sha256:old-attest"}]}"#,
        )
        .unwrap();
        assert!(!list.covers(&stale));

        // 子を持たない単一イメージは直接参照されていなければならない
        let single = ManifestIndex::from_slice(br#"{"schemaVersion": 2}"#).unwrap();
        assert!(!list.covers(&single));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::fake_docker::FakeDocker;
        use serial_test::serial;

        fn request() -> ManifestRequest {
            ManifestRequest {
                repository: "ghcr.io/acme/app".to_string(),
                tags: vec!["latest".to_string(), "v1".to_string()],
                sources: sources(),
            }
        }

        #[tokio::test]
        #[serial]
        async fn test_push_returns_list_digest() {
            let docker = FakeDocker::new();
            docker.set_inspect(
                r#"{"digest": "sha256:index", "manifests": [{"digest": "sha256:aaa"}, {"digest": "sha256:bbb"}]}"#,
            );

            let output = ManifestPusher::with_program(docker.program())
                .push(&request())
                .await
                .unwrap();

            assert_eq!(output.arch, None);
            assert_eq!(output.image_tag, "ghcr.io/acme/app:latest");
            assert_eq!(output.digest, "sha256:index");
            assert_eq!(
                docker.calls(),
                vec![
                    "buildx imagetools create -t ghcr.io/acme/app:latest -t ghcr.io/acme/app:v1 ghcr.io/acme/app@sha256:aaa ghcr.io/acme/app@sha256:bbb",
                    "buildx imagetools inspect ghcr.io/acme/app:latest --format {{json .Manifest}}",
                ]
            );
        }

        #[tokio::test]
        #[serial]
        async fn test_push_create_failure() {
            let docker = FakeDocker::new();
            docker.fail("create", 1);

            let err = ManifestPusher::with_program(docker.program())
                .push(&request())
                .await
                .unwrap_err();

            assert!(matches!(err, BuildError::ManifestFailed(msg) if msg.contains("denied")));
            // 作成に失敗したら inspect しない
            assert_eq!(docker.calls().len(), 1);
        }

        #[tokio::test]
        #[serial]
        async fn test_push_accepts_flattened_source() {
            let docker = FakeDocker::new();
            docker.set_inspect(
                r#"{"digest": "sha256:index", "manifests": [
                    {"digest": "sha256:amd-image"},
                    {"digest": "sha256:amd-attest"},
                    {"digest": "sha256:bbb"}
                ]}"#,
            );
            docker.set_inspect_for(
                "ghcr.io/acme/app@sha256:aaa",
                r#"{"manifests": [{"digest": "sha256:amd-image"}, {"digest": "sha256:amd-attest"}]}"#,
            );

            let output = ManifestPusher::with_program(docker.program())
                .push(&request())
                .await
                .unwrap();

            assert_eq!(output.digest, "sha256:index");
            let calls = docker.calls();
            assert_eq!(calls.len(), 3);
            assert!(calls[2].starts_with("buildx imagetools inspect ghcr.io/acme/app@sha256:aaa"));
        }

        #[tokio::test]
        #[serial]
        async fn test_push_rejects_stale_list() {
            let docker = FakeDocker::new();
            docker.set_inspect(
                r#"{"digest": "sha256:index", "manifests": [{"digest": "sha256:aaa"}, {"digest": "sha256:old"}]}"#,
            );
            docker.set_inspect_for(
                "ghcr.io/acme/app@sha256:bbb",
                r#"{"schemaVersion": 2, "mediaType": "application/vnd.oci.image.manifest.v1+json"}"#,
            );

            let err = ManifestPusher::with_program(docker.program())
                .push(&request())
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                BuildError::ManifestFailed(msg) if msg.contains("arm64") && msg.contains("sha256:bbb")
            ));
        }
    }
}
