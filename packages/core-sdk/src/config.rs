use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};

use crate::persona;

pub const BASE_URL_VAR: &str = "VOXRELAY_BASE_URL";
pub const PERSONA_FILE_VAR: &str = "VOXRELAY_PERSONA_FILE";
pub const TIMEOUT_VAR: &str = "VOXRELAY_UPSTREAM_TIMEOUT_SECS";

/**
 * \brief 上游 Provider 预设。两者均为 OpenAI 兼容接口，只在地址、凭据与人设上不同。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderPreset {
    OpenAI,
    GitHubModels,
}

impl ProviderPreset {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => "openai",
            ProviderPreset::GitHubModels => "github-models",
        }
    }

    /** \brief 凭据所在的环境变量名，仅用于服务端日志。 */
    pub fn credential_var(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => "OPENAI_API_KEY",
            ProviderPreset::GitHubModels => "GITHUB_TOKEN",
        }
    }

    pub fn model_var(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => "OPENAI_MODEL",
            ProviderPreset::GitHubModels => "GITHUB_MODEL",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => "https://api.openai.com/v1",
            ProviderPreset::GitHubModels => "https://models.github.ai/inference",
        }
    }

    pub fn fallback_model(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => "gpt-4o-mini",
            ProviderPreset::GitHubModels => "openai/gpt-4o-mini",
        }
    }

    pub fn persona(&self) -> &'static str {
        match self {
            ProviderPreset::OpenAI => persona::ASSISTANT,
            ProviderPreset::GitHubModels => persona::BIOGRAPHY,
        }
    }
}

impl FromStr for ProviderPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderPreset::OpenAI),
            "github-models" | "github" => Ok(ProviderPreset::GitHubModels),
            other => Err(anyhow!("unknown provider preset: {}", other)),
        }
    }
}

impl fmt::Display for ProviderPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/**
 * \brief 进程级 Provider 配置，启动时读取一次，之后不可变。
 *
 * 凭据缺失不会导致启动失败：由请求处理阶段返回配置错误。
 */
#[derive(Clone)]
pub struct ProviderConfig {
    pub preset: ProviderPreset,
    /** \brief API 密钥；None 表示部署缺少凭据 */
    pub api_key: Option<String>,
    /** \brief 上游 API 基地址，不含 /chat/completions */
    pub base_url: String,
    /** \brief 部署层面覆盖的默认模型 */
    pub default_model: Option<String>,
    /** \brief 硬编码兜底模型 */
    pub fallback_model: String,
    /** \brief 每次请求前置的 system 消息内容 */
    pub system_prompt: String,
    /** \brief 上游请求超时；None 沿用 HTTP 客户端默认值 */
    pub upstream_timeout: Option<Duration>,
}

impl ProviderConfig {
    /**
     * \brief 按预设构造，凭据与默认模型由调用方给出。
     */
    pub fn new(preset: ProviderPreset, api_key: Option<String>) -> Self {
        Self {
            preset,
            api_key,
            base_url: preset.base_url().to_string(),
            default_model: None,
            fallback_model: preset.fallback_model().to_string(),
            system_prompt: preset.persona().to_string(),
            upstream_timeout: None,
        }
    }

    /**
     * \brief 从进程环境读取配置。
     */
    pub fn from_env(preset: ProviderPreset) -> Result<Self> {
        Self::from_lookup(preset, |name| std::env::var(name).ok())
    }

    /**
     * \brief 从任意变量查找函数读取配置。空字符串视为未设置。
     */
    pub fn from_lookup<F>(preset: ProviderPreset, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = Self::new(preset, get(preset.credential_var()));
        config.default_model = get(preset.model_var()).map(|m| m.trim().to_string());
        if let Some(base) = get(BASE_URL_VAR) {
            config.base_url = base.trim().to_string();
        }
        if let Some(path) = get(PERSONA_FILE_VAR) {
            config.system_prompt = persona::load_from_file(&PathBuf::from(path))?;
        }
        if let Some(secs) = get(TIMEOUT_VAR) {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", TIMEOUT_VAR))?;
            config.upstream_timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /**
     * \brief 模型解析顺序：请求指定 > 部署默认 > 硬编码兜底。
     */
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_model.as_deref())
            .unwrap_or(self.fallback_model.as_str())
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("preset", &self.preset)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("fallback_model", &self.fallback_model)
            .field("system_prompt_len", &self.system_prompt.len())
            .field("upstream_timeout", &self.upstream_timeout)
            .finish()
    }
}
