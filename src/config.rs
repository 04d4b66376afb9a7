//! Pluggable 配置管理系统
//!
//! 支持YAML配置文件驱动的控制器：日志级别、预置选项、晚注册开关

use crate::{PluggableError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 控制器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// 宿主名称，仅用于日志
    pub name: String,
    /// 日志配置
    pub logging: LoggingConfig,
    /// 预置选项，控制器创建时写入全局选项存储
    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,
    /// 是否允许初始化完成后继续注册插件
    #[serde(default = "default_true")]
    pub allow_late_registration: bool,
}

fn default_true() -> bool {
    true
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 是否输出日志目标（模块路径）
    pub verbose: bool,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// 转换为 `EnvFilter` 指令
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            verbose: false,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: "pluggable".to_string(),
            logging: LoggingConfig::default(),
            options: BTreeMap::new(),
            allow_late_registration: true,
        }
    }
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: ControllerConfig,
}

impl ConfigManager {
    /// 从文件加载配置
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PluggableError::config(&format!("Failed to read config file: {}", e))
        })?;

        Self::from_yaml(&content)
    }

    /// 从YAML文本解析配置
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: ControllerConfig = serde_yaml::from_str(content).map_err(|e| {
            PluggableError::config(&format!("Failed to parse config file: {}", e))
        })?;

        Ok(Self { config })
    }

    /// 创建默认配置
    pub fn new_default() -> Self {
        Self {
            config: ControllerConfig::default(),
        }
    }

    /// 保存配置到文件
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(&self.config).map_err(|e| {
            PluggableError::config(&format!("Failed to serialize config: {}", e))
        })?;

        tokio::fs::write(path, content).await.map_err(|e| {
            PluggableError::config(&format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// 获取配置
    pub fn get_config(&self) -> &ControllerConfig {
        &self.config
    }

    /// 获取可变配置
    pub fn get_config_mut(&mut self) -> &mut ControllerConfig {
        &mut self.config
    }

    /// 取出配置
    pub fn into_config(self) -> ControllerConfig {
        self.config
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.config.name.trim().is_empty() {
            return Err(PluggableError::config("Controller name cannot be empty"));
        }

        for (key, value) in &self.config.options {
            if key.trim().is_empty() {
                return Err(PluggableError::config("Option keys cannot be empty"));
            }
            // 空值会让 has() 成立而不携带任何内容
            if value.is_null() {
                return Err(PluggableError::config(&format!(
                    "Preset option {:?} has no value",
                    key
                )));
            }
        }

        if let Ok(directive) = std::env::var("RUST_LOG") {
            if !directive.is_empty() {
                tracing::warn!(
                    "RUST_LOG={} overrides configured log level {:?}",
                    directive,
                    self.config.logging.level
                );
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}

/// 生成默认配置文件
pub async fn generate_default_config_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let config_manager = ConfigManager::new_default();
    config_manager.save_to_file(path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_manager_default() {
        let config_manager = ConfigManager::new_default();
        let config = config_manager.get_config();

        assert_eq!(config.name, "pluggable");
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.options.is_empty());
        assert!(config.allow_late_registration);
        assert!(config_manager.validate().is_ok());
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pluggable.yaml");

        let mut config_manager = ConfigManager::new_default();
        config_manager
            .get_config_mut()
            .options
            .insert("db".to_string(), serde_json::json!("sqlite::memory:"));
        config_manager.save_to_file(&path).await.unwrap();

        let loaded = ConfigManager::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.get_config().name, "pluggable");
        assert_eq!(
            loaded.get_config().options.get("db"),
            Some(&serde_json::json!("sqlite::memory:"))
        );
    }

    #[tokio::test]
    async fn test_generate_default_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("default.yaml");

        generate_default_config_file(&path).await.unwrap();
        let loaded = ConfigManager::load_from_file(&path).await.unwrap();
        assert!(loaded.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = ConfigManager::load_from_file("/definitely/not/here.yaml").await;
        assert!(matches!(result, Err(PluggableError::Config { .. })));
    }

    #[test]
    fn test_yaml_defaults() {
        let yaml = "name: host\nlogging:\n  level: Debug\n  verbose: true\n";
        let manager = ConfigManager::from_yaml(yaml).unwrap();
        let config = manager.get_config();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.options.is_empty());
        assert!(config.allow_late_registration);
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let mut manager = ConfigManager::new_default();
        manager.get_config_mut().name = "  ".to_string();
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_null_preset_option() {
        let yaml = "name: host\nlogging:\n  level: Info\n  verbose: false\noptions:\n  db: ~\n";
        let manager = ConfigManager::from_yaml(yaml).unwrap();

        let err = manager.validate().unwrap_err();
        assert!(err.to_string().contains("\"db\""));
    }
}
