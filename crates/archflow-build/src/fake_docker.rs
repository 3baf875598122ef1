//! テスト用の docker CLI 置き換え
//!
//! 一時ディレクトリに `docker` シェルスクリプトを置き、呼び出し引数を記録する。
//! 各ステップの終了コードや出力はディレクトリ内のファイルで切り替える。
//! スクリプトを実行するテストは `#[serial]` にすること（書き込み直後の exec が
//! 別スレッドの fork と重なると ETXTBSY になる）。

use crate::command::DockerProgram;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

const SCRIPT: &str = r#"#!/bin/sh
dir=$(dirname "$0")
printf '%s\n' "$*" >> "$dir/calls.log"
printf '%s' "${DOCKER_HOST:-}" > "$dir/host"

code() { if [ -f "$dir/$1.exit" ]; then cat "$dir/$1.exit"; else echo 0; fi; }
fail() { c=$(code "$1"); if [ "$c" != 0 ]; then echo "$2" >&2; exit "$c"; fi; }

case "$1" in
  login)
    cat > "$dir/login.stdin"
    fail login "Error response from daemon: unauthorized: incorrect username or password"
    echo "Login Succeeded"
    ;;
  buildx)
    case "$2" in
      build)
        meta=""
        prev=""
        for arg in "$@"; do
          if [ "$prev" = "--metadata-file" ]; then meta="$arg"; fi
          prev="$arg"
        done
        printf '#1 [internal] load build definition from Dockerfile\n' >&2
        printf '#5 [2/2] RUN echo caf\351 au lait\n' >&2
        fail build 'ERROR: process "/bin/sh -c make" did not complete successfully: exit code: 2'
        if [ -f "$dir/metadata.json" ] && [ -n "$meta" ]; then
          cat "$dir/metadata.json" > "$meta"
        fi
        ;;
      inspect)
        fail inspect "ERROR: no builder found"
        cat "$dir/builder.txt"
        ;;
      imagetools)
        case "$3" in
          create)
            fail create "ERROR: failed to push: denied"
            ;;
          inspect)
            fail imagetools-inspect "ERROR: not found"
            ref=$(printf '%s' "$4" | tr '/:@' '___')
            if [ -f "$dir/inspect-$ref.json" ]; then
              cat "$dir/inspect-$ref.json"
            else
              cat "$dir/inspect.json"
            fi
            ;;
        esac
        ;;
    esac
    ;;
esac
exit 0
"#;

pub(crate) struct FakeDocker {
    dir: TempDir,
}

impl FakeDocker {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("docker");
        fs::write(&script, SCRIPT).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir }
    }

    pub fn program(&self) -> DockerProgram {
        DockerProgram::new(self.dir.path().join("docker"))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// `step`（login, build, inspect, create, imagetools-inspect）を `code` で失敗させる
    pub fn fail(&self, step: &str, code: i32) {
        fs::write(self.path(&format!("{step}.exit")), code.to_string()).unwrap();
    }

    /// `buildx build` が `--metadata-file` に書き出す内容
    pub fn set_metadata(&self, json: &str) {
        fs::write(self.path("metadata.json"), json).unwrap();
    }

    /// `buildx inspect --bootstrap` の出力
    pub fn set_builder_inspect(&self, text: &str) {
        fs::write(self.path("builder.txt"), text).unwrap();
    }

    /// `imagetools inspect` の既定の出力
    pub fn set_inspect(&self, json: &str) {
        fs::write(self.path("inspect.json"), json).unwrap();
    }

    /// 特定の参照に対する `imagetools inspect` の出力
    pub fn set_inspect_for(&self, reference: &str, json: &str) {
        let name: String = reference
            .chars()
            .map(|c| if matches!(c, '/' | ':' | '@') { '_' } else { c })
            .collect();
        fs::write(self.path(&format!("inspect-{name}.json")), json).unwrap();
    }

    /// 呼び出しごとの引数（スペース区切り）
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.path("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// 最後の呼び出しで渡された DOCKER_HOST
    pub fn last_host(&self) -> String {
        fs::read_to_string(self.path("host")).unwrap_or_default()
    }

    /// `docker login` が stdin から受け取った内容
    pub fn login_stdin(&self) -> String {
        fs::read_to_string(self.path("login.stdin")).unwrap_or_default()
    }
}
