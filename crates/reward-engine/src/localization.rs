//! 消息本地化
//!
//! 策略中的消息模板与商品名称都是基础文本，发放前按客户语言本地化，
//! 再把 `{0}` 占位符替换为关联实体标题。

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::models::LanguageId;

/// 模板占位符
pub const PLACEHOLDER: &str = "{0}";

/// 本地化提供方
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Localizer: Send + Sync {
    /// 返回 `base` 在指定语言下的文本，找不到译文时返回 `base`
    async fn localize(&self, base: &str, language: LanguageId) -> Result<String>;
}

/// 不做翻译，原样返回
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLocalizer;

#[async_trait]
impl Localizer for PassthroughLocalizer {
    async fn localize(&self, base: &str, _language: LanguageId) -> Result<String> {
        Ok(base.to_string())
    }
}

/// 基于内存资源表的本地化
#[derive(Debug, Default)]
pub struct ResourceLocalizer {
    resources: DashMap<(LanguageId, String), String>,
}

impl ResourceLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册译文（覆盖已有）
    pub fn insert(&self, language: LanguageId, base: impl Into<String>, text: impl Into<String>) {
        self.resources.insert((language, base.into()), text.into());
    }

    pub fn with(self, language: LanguageId, base: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(language, base, text);
        self
    }
}

#[async_trait]
impl Localizer for ResourceLocalizer {
    async fn localize(&self, base: &str, language: LanguageId) -> Result<String> {
        let text = self
            .resources
            .get(&(language, base.to_string()))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| base.to_string());
        Ok(text)
    }
}

/// 替换模板中的 `{0}` 占位符
pub fn format_message(template: &str, arg: &str) -> String {
    template.replace(PLACEHOLDER, arg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_message() {
        assert_eq!(
            format_message("Earned promotion for the comment to blog post {0}", "Hello"),
            "Earned promotion for the comment to blog post Hello"
        );
        assert_eq!(
            format_message("Earned promotion for the registration", "ignored"),
            "Earned promotion for the registration"
        );
    }

    #[tokio::test]
    async fn test_resource_localizer_falls_back_to_base() {
        let localizer = ResourceLocalizer::new().with(2, "Welcome {0}", "Bienvenue {0}");

        assert_eq!(
            localizer.localize("Welcome {0}", 2).await.unwrap(),
            "Bienvenue {0}"
        );
        assert_eq!(
            localizer.localize("Welcome {0}", 3).await.unwrap(),
            "Welcome {0}"
        );
    }

    #[tokio::test]
    async fn test_passthrough() {
        assert_eq!(PassthroughLocalizer.localize("x", 9).await.unwrap(), "x");
    }
}
