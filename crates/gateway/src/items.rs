//! # アイテムリポジトリ
//!
//! 変更通知の対象となるアイテムの保存先を抽象化する。
//! 現在の実装は挿入順を保持するメモリ内リポジトリのみ。

use parcel_types::{Item, ItemInput};
use tokio::sync::RwLock;

use crate::clock::now_millis;
use crate::error::GatewayError;

/// アイテムの保存先。
#[async_trait::async_trait]
pub trait ItemRepository: Send + Sync {
    /// 全件を作成順で返す。
    async fn list(&self) -> Result<Vec<Item>, GatewayError>;

    async fn get(&self, id: &str) -> Result<Option<Item>, GatewayError>;

    /// 新しいIDでアイテムを作成する。
    async fn create(&self, input: ItemInput) -> Result<Item, GatewayError>;

    /// 既存アイテムの名前・説明を置き換える。存在しなければ `None`。
    async fn update(&self, id: &str, input: ItemInput) -> Result<Option<Item>, GatewayError>;

    /// 削除したアイテムを返す。存在しなければ `None`。
    async fn delete(&self, id: &str) -> Result<Option<Item>, GatewayError>;
}

/// メモリ内リポジトリ。
#[derive(Default)]
pub struct MemoryItemRepository {
    items: RwLock<Vec<Item>>,
}

impl MemoryItemRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ItemRepository for MemoryItemRepository {
    async fn list(&self) -> Result<Vec<Item>, GatewayError> {
        Ok(self.items.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<Item>, GatewayError> {
        Ok(self.items.read().await.iter().find(|i| i.id == id).cloned())
    }

    async fn create(&self, input: ItemInput) -> Result<Item, GatewayError> {
        let now = now_millis()?;
        let item = Item {
            id: uuid::Uuid::new_v4().to_string(),
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, input: ItemInput) -> Result<Option<Item>, GatewayError> {
        let now = now_millis()?;
        let mut items = self.items.write().await;
        let Some(existing) = items.iter_mut().find(|i| i.id == id) else {
            return Ok(None);
        };
        existing.name = input.name;
        existing.description = input.description;
        existing.updated_at = now.max(existing.created_at);
        Ok(Some(existing.clone()))
    }

    async fn delete(&self, id: &str) -> Result<Option<Item>, GatewayError> {
        let mut items = self.items.write().await;
        let position = items.iter().position(|i| i.id == id);
        Ok(position.map(|index| items.remove(index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> ItemInput {
        ItemInput {
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_crud_lifecycle() {
        let repo = MemoryItemRepository::new();

        let first = repo.create(input("first")).await.unwrap();
        let second = repo.create(input("second")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(first.created_at, first.updated_at);

        let listed = repo.list().await.unwrap();
        assert_eq!(
            listed.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            vec!["first", "second"]
        );

        let updated = repo
            .update(
                &first.id,
                ItemInput {
                    name: "renamed".to_string(),
                    description: Some("desc".to_string()),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.description.as_deref(), Some("desc"));
        assert_eq!(updated.created_at, first.created_at);
        assert!(updated.updated_at >= first.updated_at);

        let removed = repo.delete(&first.id).await.unwrap().unwrap();
        assert_eq!(removed.id, first.id);
        assert!(repo.get(&first.id).await.unwrap().is_none());
        assert!(repo.delete(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_item() {
        let repo = MemoryItemRepository::new();
        assert!(repo.update("missing", input("x")).await.unwrap().is_none());
    }
}
