use crate::shared::error::{ControlPlaneError, ControlPlaneResult};
use crate::shared::types::{Instance, ListOptions, ListResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Repository trait for instance storage. Every read returns an owned copy.
#[async_trait]
pub trait InstanceRepository: Send + Sync {
    /// Store a new instance, returning its initial version
    async fn insert(&self, instance: &Instance) -> ControlPlaneResult<u64>;

    async fn get_by_id(&self, tenant_id: &str, instance_id: &str) -> ControlPlaneResult<Instance>;

    async fn get_by_slug(&self, tenant_id: &str, slug: &str) -> ControlPlaneResult<Instance>;

    async fn list(&self, tenant_id: &str, options: &ListOptions) -> ControlPlaneResult<ListResult>;

    /// Replace the stored record when `instance.version` matches it,
    /// returning the new version
    async fn update(&self, instance: &Instance) -> ControlPlaneResult<u64>;

    async fn delete(&self, tenant_id: &str, instance_id: &str) -> ControlPlaneResult<()>;

    async fn count_by_tenant(&self, tenant_id: &str) -> ControlPlaneResult<usize>;
}

#[derive(Default)]
struct Storage {
    instances: HashMap<String, Instance>,
    /// (tenant, slug) -> instance ID
    slugs: HashMap<(String, String), String>,
}

/// In-memory implementation of instance repository
#[derive(Clone, Default)]
pub struct InMemoryInstanceRepository {
    storage: Arc<RwLock<Storage>>,
}

impl InMemoryInstanceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> ControlPlaneError {
        ControlPlaneError::StorageError("Lock poisoned".to_string())
    }

    fn not_found(instance_id: &str) -> ControlPlaneError {
        ControlPlaneError::NotFound(format!("instance {instance_id}"))
    }
}

#[async_trait]
impl InstanceRepository for InMemoryInstanceRepository {
    async fn insert(&self, instance: &Instance) -> ControlPlaneResult<u64> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        if storage.instances.contains_key(&instance.instance_id) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "instance {}",
                instance.instance_id
            )));
        }
        let slug_key = (instance.tenant_id.clone(), instance.slug.clone());
        if storage.slugs.contains_key(&slug_key) {
            return Err(ControlPlaneError::AlreadyExists(format!(
                "slug {:?} in tenant {}",
                instance.slug, instance.tenant_id
            )));
        }

        let mut stored = instance.clone();
        stored.version = 1;
        storage.slugs.insert(slug_key, stored.instance_id.clone());
        storage.instances.insert(stored.instance_id.clone(), stored);
        Ok(1)
    }

    async fn get_by_id(&self, tenant_id: &str, instance_id: &str) -> ControlPlaneResult<Instance> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        storage
            .instances
            .get(instance_id)
            .filter(|instance| instance.tenant_id == tenant_id)
            .cloned()
            .ok_or_else(|| Self::not_found(instance_id))
    }

    async fn get_by_slug(&self, tenant_id: &str, slug: &str) -> ControlPlaneResult<Instance> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        storage
            .slugs
            .get(&(tenant_id.to_string(), slug.to_string()))
            .and_then(|instance_id| storage.instances.get(instance_id))
            .cloned()
            .ok_or_else(|| ControlPlaneError::NotFound(format!("instance with slug {slug:?}")))
    }

    async fn list(&self, tenant_id: &str, options: &ListOptions) -> ControlPlaneResult<ListResult> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;

        let mut matching: Vec<&Instance> = storage
            .instances
            .values()
            .filter(|instance| instance.tenant_id == tenant_id)
            .filter(|instance| options.state.map_or(true, |state| instance.state == state))
            .filter(|instance| {
                options
                    .label
                    .as_deref()
                    .map_or(true, |label| instance.matches_label(label))
            })
            .filter(|instance| {
                options
                    .provider
                    .as_deref()
                    .map_or(true, |provider| instance.provider_name == provider)
            })
            .collect();
        // Newest first, ties broken by ID
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });

        let total = matching.len();
        let start = match options.cursor.as_deref() {
            Some(cursor) => {
                let position = matching
                    .iter()
                    .position(|instance| instance.instance_id == cursor)
                    .ok_or_else(|| {
                        ControlPlaneError::ValidationError(format!("unknown cursor {cursor:?}"))
                    })?;
                position + 1
            }
            None => 0,
        };
        let end = if options.limit == 0 {
            total
        } else {
            start.saturating_add(options.limit).min(total)
        };

        let items: Vec<Instance> = matching[start..end].iter().map(|i| (*i).clone()).collect();
        let next_cursor = match items.last() {
            Some(last) if end < total => Some(last.instance_id.clone()),
            _ => None,
        };

        Ok(ListResult {
            items,
            next_cursor,
            total,
        })
    }

    async fn update(&self, instance: &Instance) -> ControlPlaneResult<u64> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        let (stored_version, old_slug) = match storage.instances.get(&instance.instance_id) {
            Some(stored) if stored.tenant_id == instance.tenant_id => {
                (stored.version, stored.slug.clone())
            }
            _ => return Err(Self::not_found(&instance.instance_id)),
        };

        if stored_version != instance.version {
            return Err(ControlPlaneError::Conflict(format!(
                "instance {} is at version {}, update carried version {}",
                instance.instance_id, stored_version, instance.version
            )));
        }

        if old_slug != instance.slug {
            let new_key = (instance.tenant_id.clone(), instance.slug.clone());
            if storage.slugs.contains_key(&new_key) {
                return Err(ControlPlaneError::AlreadyExists(format!(
                    "slug {:?} in tenant {}",
                    instance.slug, instance.tenant_id
                )));
            }
            storage
                .slugs
                .remove(&(instance.tenant_id.clone(), old_slug));
            storage.slugs.insert(new_key, instance.instance_id.clone());
        }

        let mut stored = instance.clone();
        stored.version = stored_version + 1;
        let version = stored.version;
        storage.instances.insert(stored.instance_id.clone(), stored);
        Ok(version)
    }

    async fn delete(&self, tenant_id: &str, instance_id: &str) -> ControlPlaneResult<()> {
        let mut storage = self.storage.write().map_err(|_| Self::poisoned())?;

        let slug = match storage.instances.get(instance_id) {
            Some(stored) if stored.tenant_id == tenant_id => stored.slug.clone(),
            _ => return Err(Self::not_found(instance_id)),
        };
        storage.instances.remove(instance_id);
        storage.slugs.remove(&(tenant_id.to_string(), slug));
        Ok(())
    }

    async fn count_by_tenant(&self, tenant_id: &str) -> ControlPlaneResult<usize> {
        let storage = self.storage.read().map_err(|_| Self::poisoned())?;
        Ok(storage
            .instances
            .values()
            .filter(|instance| instance.tenant_id == tenant_id)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::InstanceState;
    use chrono::{Duration, Utc};

    fn create_test_instance(tenant_id: &str, name: &str) -> Instance {
        Instance::new(tenant_id, name, "nginx:latest", "local")
    }

    async fn insert(repo: &InMemoryInstanceRepository, instance: &Instance) -> Instance {
        let mut stored = instance.clone();
        stored.version = repo.insert(instance).await.unwrap();
        stored
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let repo = InMemoryInstanceRepository::new();
        let instance = create_test_instance("acme", "web");

        let version = repo.insert(&instance).await.unwrap();
        assert_eq!(version, 1);

        let retrieved = repo.get_by_id("acme", &instance.instance_id).await.unwrap();
        assert_eq!(retrieved.name, "web");
        assert_eq!(retrieved.version, 1);

        let by_slug = repo.get_by_slug("acme", "web").await.unwrap();
        assert_eq!(by_slug.instance_id, instance.instance_id);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let repo = InMemoryInstanceRepository::new();
        let err = repo.get_by_id("acme", "nonexistent").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let repo = InMemoryInstanceRepository::new();
        let instance = insert(&repo, &create_test_instance("acme", "web")).await;

        assert!(matches!(
            repo.get_by_id("globex", &instance.instance_id).await,
            Err(ControlPlaneError::NotFound(_))
        ));
        assert!(matches!(
            repo.get_by_slug("globex", "web").await,
            Err(ControlPlaneError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete("globex", &instance.instance_id).await,
            Err(ControlPlaneError::NotFound(_))
        ));

        let mut foreign = instance.clone();
        foreign.tenant_id = "globex".to_string();
        assert!(matches!(
            repo.update(&foreign).await,
            Err(ControlPlaneError::NotFound(_))
        ));
        assert_eq!(repo.count_by_tenant("globex").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected_within_tenant_only() {
        let repo = InMemoryInstanceRepository::new();
        insert(&repo, &create_test_instance("acme", "Web App")).await;

        let err = repo
            .insert(&create_test_instance("acme", "web-app"))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::AlreadyExists(_)));

        // Same slug in another tenant is fine
        insert(&repo, &create_test_instance("globex", "web-app")).await;
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let repo = InMemoryInstanceRepository::new();
        let instance = insert(&repo, &create_test_instance("acme", "web")).await;

        let mut copy = instance.clone();
        copy.slug = "other".to_string();
        assert!(matches!(
            repo.insert(&copy).await,
            Err(ControlPlaneError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_rejects_stale_copy() {
        let repo = InMemoryInstanceRepository::new();
        let instance = insert(&repo, &create_test_instance("acme", "web")).await;

        let mut first = repo.get_by_id("acme", &instance.instance_id).await.unwrap();
        let mut second = first.clone();

        first.state = InstanceState::Starting;
        assert_eq!(repo.update(&first).await.unwrap(), 2);

        second.state = InstanceState::Failed;
        let err = repo.update(&second).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Conflict(_)));

        let stored = repo.get_by_id("acme", &instance.instance_id).await.unwrap();
        assert_eq!(stored.state, InstanceState::Starting);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_update_moves_slug_index() {
        let repo = InMemoryInstanceRepository::new();
        let mut web = insert(&repo, &create_test_instance("acme", "web")).await;
        insert(&repo, &create_test_instance("acme", "api")).await;

        web.slug = "api".to_string();
        assert!(matches!(
            repo.update(&web).await,
            Err(ControlPlaneError::AlreadyExists(_))
        ));

        web.slug = "frontend".to_string();
        repo.update(&web).await.unwrap();
        assert!(repo.get_by_slug("acme", "frontend").await.is_ok());
        assert!(repo.get_by_slug("acme", "web").await.is_err());
    }

    #[tokio::test]
    async fn test_reads_return_independent_copies() {
        let repo = InMemoryInstanceRepository::new();
        let instance = insert(&repo, &create_test_instance("acme", "web")).await;

        let mut retrieved = repo.get_by_id("acme", &instance.instance_id).await.unwrap();
        retrieved.state = InstanceState::Stopped;

        let stored = repo.get_by_id("acme", &instance.instance_id).await.unwrap();
        assert_eq!(stored.state, InstanceState::Provisioning);
    }

    #[tokio::test]
    async fn test_delete_frees_slug() {
        let repo = InMemoryInstanceRepository::new();
        let instance = insert(&repo, &create_test_instance("acme", "web")).await;

        repo.delete("acme", &instance.instance_id).await.unwrap();
        assert!(repo.get_by_id("acme", &instance.instance_id).await.is_err());
        assert!(matches!(
            repo.delete("acme", &instance.instance_id).await,
            Err(ControlPlaneError::NotFound(_))
        ));
        insert(&repo, &create_test_instance("acme", "web")).await;
    }

    async fn seed_for_listing(repo: &InMemoryInstanceRepository) -> Vec<Instance> {
        let base = Utc::now();
        let mut seeded = Vec::new();
        for (i, (name, provider, state)) in [
            ("a", "local", InstanceState::Running),
            ("b", "docker", InstanceState::Stopped),
            ("c", "local", InstanceState::Running),
            ("d", "local", InstanceState::Failed),
        ]
        .into_iter()
        .enumerate()
        {
            let mut instance = Instance::new("acme", name, "nginx:latest", provider);
            instance.state = state;
            instance.created_at = base + Duration::seconds(i as i64);
            if i % 2 == 0 {
                instance.labels.insert("tier".to_string(), "web".to_string());
            } else {
                instance.labels.insert("tier".to_string(), "batch".to_string());
            }
            seeded.push(insert(repo, &instance).await);
        }
        insert(repo, &create_test_instance("globex", "z")).await;
        seeded
    }

    fn names(result: &ListResult) -> Vec<&str> {
        result.items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_newest_first_with_cursor_pagination() {
        let repo = InMemoryInstanceRepository::new();
        seed_for_listing(&repo).await;

        let first = repo
            .list(
                "acme",
                &ListOptions {
                    limit: 3,
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(names(&first), vec!["d", "c", "b"]);
        assert_eq!(first.total, 4);
        let cursor = first.next_cursor.clone().unwrap();
        assert_eq!(cursor, first.items[2].instance_id);

        let second = repo
            .list(
                "acme",
                &ListOptions {
                    limit: 3,
                    cursor: Some(cursor),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(names(&second), vec!["a"]);
        assert!(second.next_cursor.is_none());
        assert_eq!(second.total, 4);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = InMemoryInstanceRepository::new();
        seed_for_listing(&repo).await;

        let running = repo
            .list(
                "acme",
                &ListOptions {
                    state: Some(InstanceState::Running),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(names(&running), vec!["c", "a"]);
        assert_eq!(running.total, 2);

        let web = repo
            .list(
                "acme",
                &ListOptions {
                    label: Some("tier=web".to_string()),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(names(&web), vec!["c", "a"]);

        let labelled = repo
            .list(
                "acme",
                &ListOptions {
                    label: Some("tier".to_string()),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(labelled.total, 4);

        let docker = repo
            .list(
                "acme",
                &ListOptions {
                    provider: Some("docker".to_string()),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(names(&docker), vec!["b"]);
        assert!(docker.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_unknown_cursor() {
        let repo = InMemoryInstanceRepository::new();
        seed_for_listing(&repo).await;

        let err = repo
            .list(
                "acme",
                &ListOptions {
                    cursor: Some("inst_gone".to_string()),
                    ..ListOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ControlPlaneError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_arc_clone_behavior() {
        let repo = InMemoryInstanceRepository::new();
        let repo_clone = repo.clone();

        insert(&repo, &create_test_instance("acme", "one")).await;
        insert(&repo_clone, &create_test_instance("acme", "two")).await;

        // Both handles share storage
        assert_eq!(repo.count_by_tenant("acme").await.unwrap(), 2);
        assert_eq!(repo_clone.count_by_tenant("acme").await.unwrap(), 2);
    }
}
