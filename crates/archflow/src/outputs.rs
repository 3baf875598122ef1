//! ステップ出力
//!
//! `key=value` 形式で stdout に出力し、`--output-file`（GitHub Actions では
//! `$GITHUB_OUTPUT`）にも追記する。

use archflow_build::PipelineReport;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    entries: Vec<(String, String)>,
}

impl Outputs {
    pub fn from_report(report: &PipelineReport) -> Self {
        let mut outputs = Self::default();
        let final_output = report.final_output();
        outputs.push("image_tag", final_output.image_tag);
        outputs.push("digest", final_output.digest);

        if report.multiarch {
            for output in &report.outputs {
                if let Some(arch) = output.arch {
                    outputs.push(format!("{}_image_tag", arch), output.image_tag.clone());
                    outputs.push(format!("{}_digest", arch), output.digest.clone());
                }
            }
        }

        outputs
    }

    fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_lines(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}\n", k, v))
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect(),
        )
    }

    /// 出力ファイルに追記
    pub fn append_to(&self, path: &Path) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(self.to_lines().as_bytes())
    }

    /// stdout への表示と出力ファイルへの追記
    pub fn emit(&self, json: bool, output_file: Option<&Path>) -> anyhow::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&self.to_json())?);
        } else {
            print!("{}", self.to_lines());
        }

        if let Some(path) = output_file {
            self.append_to(path)?;
            tracing::debug!("Wrote outputs to {}", path.display());
        }

        Ok(())
    }
}
