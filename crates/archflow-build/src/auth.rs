//! レジストリ認証処理
//!
//! プッシュ時に必要な認証情報を検証し、`docker login` の引数を組み立てます。

use crate::error::{BuildError, BuildResult};
use std::fmt;

/// 呼び出し元から渡されたレジストリ認証情報（未検証）
#[derive(Clone, Default)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

/// 検証済みの認証情報
#[derive(Clone)]
pub struct RegistryCredentials {
    pub username: String,
    password: String,
}

impl RegistryAuth {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self { username, password }
    }

    /// 認証情報なし（push=false 用）
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// 認証情報を取り出す
    ///
    /// ユーザー名・パスワードのどちらかが未指定または空の場合は
    /// `MissingCredentials` を返す。
    pub fn credentials(&self) -> BuildResult<RegistryCredentials> {
        let username = present(&self.username);
        let password = present(&self.password);

        match (username, password) {
            (Some(username), Some(password)) => Ok(RegistryCredentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            (None, None) => Err(BuildError::MissingCredentials(
                "registry_username, registry_password",
            )),
            (None, Some(_)) => Err(BuildError::MissingCredentials("registry_username")),
            (Some(_), None) => Err(BuildError::MissingCredentials("registry_password")),
        }
    }
}

impl RegistryCredentials {
    pub fn password(&self) -> &str {
        &self.password
    }

    /// `docker login` の引数（パスワードは stdin で渡す）
    pub fn login_args(&self, registry: &str) -> Vec<String> {
        vec![
            "login".to_string(),
            registry.to_string(),
            "--username".to_string(),
            self.username.clone(),
            "--password-stdin".to_string(),
        ]
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
