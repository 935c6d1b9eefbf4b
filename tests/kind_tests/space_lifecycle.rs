//! Integration tests for the Space lifecycle
//!
//! A tenant adds a Space to its Organization. The operator creates the Space's
//! namespace with bindings for the Space's members, and on deletion removes the
//! namespace before letting the Space go.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::RoleBinding;
use kube::api::{Api, DeleteParams, PostParams};

use organization_operator::controller::SPACE_FINALIZER;
use organization_operator::crd::{Organization, OrganizationSpec, Space, SpaceSpec};
use organization_operator::labels::{ORGANIZATION_LABEL, SPACE_LABEL};
use organization_operator::naming::{space_namespace, spaces_namespace};

use super::helpers::{ensure_test_cluster, start_operator, unique_name, wait_for, CONVERGE_TIMEOUT};

/// Create an Organization and wait until its spaces namespace exists
async fn onboard_organization(client: &kube::Client, name: &str) {
    let orgs: Api<Organization> = Api::all(client.clone());
    orgs.create(
        &PostParams::default(),
        &Organization::new(
            name,
            OrganizationSpec {
                admin_groups: vec!["org-admins".to_string()],
                default_namespace_labels: BTreeMap::from([(
                    "tenant".to_string(),
                    name.to_string(),
                )]),
                ..Default::default()
            },
        ),
    )
    .await
    .expect("create organization");

    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns_name = spaces_namespace(name);
    wait_for("spaces namespace", CONVERGE_TIMEOUT, || {
        let namespaces = namespaces.clone();
        let ns_name = ns_name.clone();
        async move { namespaces.get_opt(&ns_name).await.ok().flatten() }
    })
    .await;
}

/// A Space as the admission webhook would have stored it
fn space(name: &str) -> Space {
    let mut space = Space::new(
        name,
        SpaceSpec {
            admins: vec!["alice".to_string()],
            viewers: vec!["bob".to_string()],
            ..Default::default()
        },
    );
    space.metadata.finalizers = Some(vec![SPACE_FINALIZER.to_string()]);
    space
}

/// Story: a new Space gets a labelled namespace and three bindings
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_space_gets_namespace_and_bindings() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let operator = start_operator(client.clone());

    let org = unique_name("tenant");
    onboard_organization(&client, &org).await;

    let spaces: Api<Space> = Api::namespaced(client.clone(), &spaces_namespace(&org));
    spaces
        .create(&PostParams::default(), &space("team1"))
        .await
        .expect("create space");

    let ns_name = space_namespace(&org, "team1");
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = wait_for("space namespace", CONVERGE_TIMEOUT, || {
        let namespaces = namespaces.clone();
        let ns_name = ns_name.clone();
        async move { namespaces.get_opt(&ns_name).await.ok().flatten() }
    })
    .await;
    let labels = ns.metadata.labels.unwrap_or_default();
    assert_eq!(labels.get(ORGANIZATION_LABEL), Some(&org));
    assert_eq!(labels.get(SPACE_LABEL).map(String::as_str), Some("team1"));
    assert_eq!(labels.get("tenant"), Some(&org));

    let bindings: Api<RoleBinding> = Api::namespaced(client.clone(), &ns_name);
    let admins = wait_for("administrators binding", CONVERGE_TIMEOUT, || {
        let bindings = bindings.clone();
        async move { bindings.get_opt("administrators").await.ok().flatten() }
    })
    .await;
    assert_eq!(admins.role_ref.name, "admin");
    let subjects: Vec<(String, String)> = admins
        .subjects
        .unwrap_or_default()
        .into_iter()
        .map(|s| (s.kind, s.name))
        .collect();
    assert_eq!(
        subjects,
        vec![
            ("Group".to_string(), "org-admins".to_string()),
            ("User".to_string(), "alice".to_string()),
        ]
    );

    for binding in ["editors", "viewers"] {
        wait_for(binding, CONVERGE_TIMEOUT, || {
            let bindings = bindings.clone();
            async move { bindings.get_opt(binding).await.ok().flatten() }
        })
        .await;
    }

    let orgs: Api<Organization> = Api::all(client.clone());
    spaces
        .delete("team1", &DeleteParams::default())
        .await
        .expect("delete space");
    orgs.delete(&org, &DeleteParams::default())
        .await
        .expect("delete organization");
    operator.abort();
}

/// Story: deleting a Space removes its namespace before the Space goes away
#[tokio::test]
#[ignore = "requires kind cluster"]
async fn story_space_deletion_waits_for_namespace() {
    let client = ensure_test_cluster().await.expect("test cluster");
    let operator = start_operator(client.clone());

    let org = unique_name("teardown");
    onboard_organization(&client, &org).await;

    let spaces: Api<Space> = Api::namespaced(client.clone(), &spaces_namespace(&org));
    spaces
        .create(&PostParams::default(), &space("team1"))
        .await
        .expect("create space");

    let ns_name = space_namespace(&org, "team1");
    let namespaces: Api<Namespace> = Api::all(client.clone());
    wait_for("space namespace", CONVERGE_TIMEOUT, || {
        let namespaces = namespaces.clone();
        let ns_name = ns_name.clone();
        async move { namespaces.get_opt(&ns_name).await.ok().flatten() }
    })
    .await;

    spaces
        .delete("team1", &DeleteParams::default())
        .await
        .expect("delete space");

    // Namespace termination in kind can take a while
    wait_for("space to be finalized", CONVERGE_TIMEOUT * 2, || {
        let spaces = spaces.clone();
        async move {
            match spaces.get_opt("team1").await {
                Ok(None) => Some(()),
                _ => None,
            }
        }
    })
    .await;

    let remaining = namespaces.get_opt(&ns_name).await.expect("get namespace");
    assert!(
        remaining.is_none(),
        "namespace must be gone before the Space is released"
    );

    let orgs: Api<Organization> = Api::all(client.clone());
    orgs.delete(&org, &DeleteParams::default())
        .await
        .expect("delete organization");
    operator.abort();
}
