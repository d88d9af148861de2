//! SQLite 存储集成测试（临时文件）

#[cfg(test)]
mod tests {
    use hive::store::{
        ClearableField, EntityKind, EntityPatch, EntityStore, NewGroup, NewPerson, SqliteEntityStore,
        StoreError,
    };

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("directory.db");

        let id = {
            let store = SqliteEntityStore::open(&path).unwrap();
            let bureau = store
                .create_group(NewGroup {
                    name: "Bureau".into(),
                    description: Some("Instance dirigeante".into()),
                    parent_id: None,
                })
                .await
                .unwrap();
            store
                .create_person(NewPerson {
                    first_name: "Jean".into(),
                    last_name: "Dupont".into(),
                    group_id: Some(bureau.id),
                    ..Default::default()
                })
                .await
                .unwrap()
                .id
        };

        let store = SqliteEntityStore::open(&path).unwrap();
        let found = store.search("dupont", Some(EntityKind::Person), 20).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert!(found[0].parent_id.is_some());
    }

    #[tokio::test]
    async fn test_update_rules() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEntityStore::open(dir.path().join("d.db")).unwrap();

        let root = store
            .create_group(NewGroup {
                name: "Direction".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let child = store
            .create_group(NewGroup {
                name: "Finances".into(),
                parent_id: Some(root.id),
                ..Default::default()
            })
            .await
            .unwrap();

        let cycle = store
            .update(
                root.id,
                EntityPatch {
                    parent_id: Some(child.id),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(cycle, Err(StoreError::Constraint(_))));

        let dup = store
            .create_group(NewGroup {
                name: "FINANCES".into(),
                parent_id: Some(root.id),
                ..Default::default()
            })
            .await;
        assert!(matches!(dup, Err(StoreError::Constraint(_))));

        let p = store
            .create_person(NewPerson {
                first_name: "Anne".into(),
                last_name: "Martin".into(),
                email: Some("anne@exemple.fr".into()),
                group_id: Some(child.id),
                ..Default::default()
            })
            .await
            .unwrap();
        let updated = store
            .update(
                p.id,
                EntityPatch {
                    role: Some("Trésorière".into()),
                    clear: vec![ClearableField::Email, ClearableField::ParentId],
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.role.as_deref(), Some("Trésorière"));
        assert!(updated.email.is_none());
        assert!(updated.parent_id.is_none());

        let reloaded = store.get(p.id).await.unwrap().unwrap();
        assert_eq!(reloaded, updated);
    }
}
