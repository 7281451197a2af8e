use std::path::Path;
use std::str::FromStr as _;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use rampr_core::{RampPolicy, RunProfile, Stage};

/// On-disk shape of a run profile. Either `vus` + `duration` (constant
/// population) or `startVUs` + `stages` (ramping); stages win when both are
/// present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileYaml {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duration: Option<YamlDuration>,

    #[serde(rename = "startVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_vus: Option<u64>,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub stages: Vec<StageYaml>,

    #[serde(rename = "maxVUs")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_vus: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub grace_period: Option<YamlDuration>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ramp_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StageYaml {
    pub target: u64,

    #[serde(default)]
    pub duration: YamlDuration,
}

impl ProfileYaml {
    pub(crate) fn run_profile(&self) -> anyhow::Result<RunProfile> {
        if !self.stages.is_empty() {
            let stages = self
                .stages
                .iter()
                .map(|s| Stage {
                    duration: s.duration.into_inner(),
                    target: s.target,
                })
                .collect();
            return Ok(RunProfile::ramping(self.start_vus.unwrap_or(0), stages));
        }

        let vus = self
            .vus
            .context("profile needs either `stages` or `vus` + `duration`")?;
        let duration = self
            .duration
            .context("profile needs either `stages` or `vus` + `duration`")?;
        Ok(RunProfile::constant(vus, duration.into_inner()))
    }

    pub(crate) fn ramp_policy(&self) -> anyhow::Result<Option<RampPolicy>> {
        self.ramp_policy
            .as_deref()
            .map(|raw| {
                RampPolicy::from_str(raw.trim())
                    .map_err(|_| anyhow::anyhow!("invalid rampPolicy `{raw}` (expected linear or step)"))
            })
            .transpose()
    }
}

pub(crate) async fn load_profile(path: &Path) -> anyhow::Result<ProfileYaml> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read profile YAML: {}", path.display()))?;

    serde_yaml::from_slice(&bytes)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct YamlDuration(Duration);

impl YamlDuration {
    pub(crate) fn into_inner(self) -> Duration {
        self.0
    }
}

impl From<Duration> for YamlDuration {
    fn from(value: Duration) -> Self {
        Self(value)
    }
}

impl Serialize for YamlDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

impl<'de> Deserialize<'de> for YamlDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = YamlDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s), integer seconds, or float seconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(YamlDuration(Duration::from_secs(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v <= 0 {
                    return Err(E::custom("duration must be positive"));
                }
                Ok(YamlDuration(Duration::from_secs(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v <= 0.0 {
                    return Err(E::custom("duration must be a positive, finite number"));
                }
                Ok(YamlDuration(Duration::from_secs_f64(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(YamlDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(V)
    }
}
