//! 外部实体的只读视图
//!
//! 客户、店铺与内容实体均由宿主系统维护，引擎只关心发放决策需要的字段。

use serde::{Deserialize, Serialize};

/// 语言标识
pub type LanguageId = i64;

/// 客户
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub email: Option<String>,
    pub role_ids: Vec<i64>,
}

impl Customer {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            email: None,
            role_ids: Vec::new(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_roles(mut self, role_ids: impl IntoIterator<Item = i64>) -> Self {
        self.role_ids = role_ids.into_iter().collect();
        self
    }

    pub fn has_role(&self, role_id: i64) -> bool {
        self.role_ids.contains(&role_id)
    }
}

/// 店铺
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: i64,
    pub name: String,
}

/// 带标题的内容实体（博文、新闻、商品）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    pub title: String,
}

impl ContentItem {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
        }
    }
}
