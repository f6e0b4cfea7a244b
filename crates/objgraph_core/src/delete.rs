//! Delete semantics: state transition plus delete-rule processing.

use crate::action::{ArcContext, GraphAction};
use crate::error::{GraphError, GraphResult};
use crate::manager::GraphManager;
use objgraph_model::{DeleteRule, Identity, PersistenceState, PropertyDescriptor, Schema};

/// Deletes a node, applying the mapped delete rules to related objects.
///
/// Returns `Ok(false)` if the node exists but is already transient or
/// deleted, `Ok(true)` after a successful delete. A violated DENY rule
/// fails before any related object is touched, and the node's state is
/// restored.
///
/// A NEW node never reaches the store: it is unregistered outright and
/// every operation referencing it is purged from the change log.
///
/// When a rule violation surfaces from deeper in a cascade, only this
/// root node's state is restored. Intermediate cascade steps that already
/// moved to DELETED stay that way.
pub fn perform_delete(
    manager: &mut GraphManager,
    schema: &Schema,
    id: &Identity,
) -> GraphResult<bool> {
    delete_node(manager, schema, id, true)
}

fn delete_node(
    manager: &mut GraphManager,
    schema: &Schema,
    id: &Identity,
    is_root: bool,
) -> GraphResult<bool> {
    let old_state = manager
        .get_node(id)
        .map(|n| n.state())
        .ok_or_else(|| GraphError::not_registered(id))?;

    match old_state {
        PersistenceState::Transient | PersistenceState::Deleted => return Ok(false),
        _ => {}
    }
    let was_new = old_state == PersistenceState::New;

    // Snapshot relationships up front; rule processing mutates the node.
    let mut relationships = Vec::new();
    for (name, descriptor) in schema.entity(id.entity())?.relationships() {
        let Some(rule) = descriptor.delete_rule() else {
            continue;
        };
        let targets = match descriptor {
            PropertyDescriptor::ToOne { .. } => match manager.get_node(id) {
                Some(node) => node.to_one(name).into_iter().collect(),
                None => Vec::new(),
            },
            PropertyDescriptor::ToMany { .. } => match manager.get_node(id) {
                Some(node) => node.to_many(name),
                None => Vec::new(),
            },
            PropertyDescriptor::Scalar => Vec::new(),
        };
        relationships.push((
            name.to_owned(),
            matches!(descriptor, PropertyDescriptor::ToOne { .. }),
            rule,
            targets,
        ));
    }

    // All DENY rules are checked before any side effect is applied, so a
    // denied delete leaves related objects untouched.
    for (name, _, rule, targets) in &relationships {
        if *rule == DeleteRule::Deny && !targets.is_empty() {
            return Err(GraphError::delete_denied(name, targets.len()));
        }
    }

    if let Some(node) = manager.node_mut(id) {
        node.set_state(if was_new {
            PersistenceState::Transient
        } else {
            PersistenceState::Deleted
        });
    }

    for (name, is_to_one, rule, targets) in &relationships {
        match rule {
            DeleteRule::NoAction | DeleteRule::Deny => {}
            DeleteRule::Nullify => {
                let mut cx = ArcContext::new();
                let mut action = GraphAction::new(manager, schema);
                let result = if *is_to_one {
                    action.handle_to_one_change(id, name, None, &mut cx)
                } else {
                    targets.iter().try_for_each(|target| {
                        action.handle_to_many_remove(id, name, target, &mut cx)
                    })
                };
                if let Err(err) = result {
                    if is_root {
                        revert_state(manager, id, old_state);
                    }
                    return Err(err);
                }
            }
            DeleteRule::Cascade => {
                for target in targets {
                    // Not materialized here, or already being deleted:
                    // nothing to cascade into.
                    if !manager.contains_node(target) {
                        continue;
                    }
                    if let Err(err) = delete_node(manager, schema, target, false) {
                        if is_root {
                            revert_state(manager, id, old_state);
                        }
                        return Err(err);
                    }
                }
            }
        }
    }

    if was_new {
        manager.unregister_node(id);
        manager.change_log_mut().unregister_node(id);
        tracing::debug!(%id, "new node deleted, change log purged");
    } else {
        manager.node_removed(id);
    }
    Ok(true)
}

fn revert_state(manager: &mut GraphManager, id: &Identity, state: PersistenceState) {
    if let Some(node) = manager.node_mut(id) {
        node.set_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::GraphNode;
    use objgraph_model::Value;

    fn schema() -> Schema {
        Schema::builder()
            .entity("Artist", |e| {
                e.scalar("name").to_many(
                    "paintings",
                    "Painting",
                    Some("artist"),
                    DeleteRule::Cascade,
                )
            })
            .entity("Painting", |e| {
                e.scalar("title")
                    .to_one("artist", "Artist", Some("paintings"), DeleteRule::Nullify)
                    .to_one("gallery", "Gallery", Some("paintings"), DeleteRule::NoAction)
            })
            .entity("Gallery", |e| {
                e.scalar("name")
                    .to_many("paintings", "Painting", Some("gallery"), DeleteRule::Deny)
            })
            .build()
    }

    fn register(m: &mut GraphManager, id: &Identity, state: PersistenceState) {
        m.register_node(id.clone(), GraphNode::new(id.clone(), state));
    }

    fn artist() -> Identity {
        Identity::permanent("Artist", "id", 1)
    }

    fn painting(n: i64) -> Identity {
        Identity::permanent("Painting", "id", n)
    }

    fn gallery() -> Identity {
        Identity::permanent("Gallery", "id", 1)
    }

    fn link_to_many(m: &mut GraphManager, schema: &Schema, owner: &Identity, arc: &str, target: &Identity) {
        let mut cx = ArcContext::new();
        GraphAction::new(m, schema)
            .handle_to_many_add(owner, arc, target, &mut cx)
            .unwrap();
    }

    #[test]
    fn committed_node_moves_to_deleted() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let a = artist();
        register(&mut m, &a, PersistenceState::Committed);

        assert!(perform_delete(&mut m, &schema, &a).unwrap());
        assert_eq!(m.get_node(&a).unwrap().state(), PersistenceState::Deleted);
        assert_eq!(m.diffs().len(), 1);
    }

    #[test]
    fn deleting_twice_is_a_noop() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let a = artist();
        register(&mut m, &a, PersistenceState::Committed);

        assert!(perform_delete(&mut m, &schema, &a).unwrap());
        assert!(!perform_delete(&mut m, &schema, &a).unwrap());
        assert_eq!(m.diffs().len(), 1);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        assert!(matches!(
            perform_delete(&mut m, &schema, &artist()),
            Err(GraphError::NotRegistered { .. })
        ));
    }

    #[test]
    fn new_node_is_unregistered_and_log_purged() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let a = Identity::temporary("Artist");
        register(&mut m, &a, PersistenceState::New);
        m.node_created(&a);
        GraphAction::new(&mut m, &schema)
            .handle_scalar_change(&a, "name", Value::Text("x".into()))
            .unwrap();

        assert!(perform_delete(&mut m, &schema, &a).unwrap());
        assert!(!m.contains_node(&a));
        // The store must never see an insert for it.
        assert!(!m.has_changes());
    }

    #[test]
    fn nullify_clears_both_sides() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let (a, p) = (artist(), painting(1));
        register(&mut m, &a, PersistenceState::Committed);
        register(&mut m, &p, PersistenceState::Committed);
        link_to_many(&mut m, &schema, &a, "paintings", &p);

        assert!(perform_delete(&mut m, &schema, &p).unwrap());
        assert_eq!(m.get_node(&p).unwrap().to_one("artist"), None);
        assert!(m.get_node(&a).unwrap().to_many("paintings").is_empty());
        assert_eq!(m.get_node(&a).unwrap().state(), PersistenceState::Modified);
    }

    #[test]
    fn cascade_deletes_related() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let (a, p1, p2) = (artist(), painting(1), painting(2));
        register(&mut m, &a, PersistenceState::Committed);
        register(&mut m, &p1, PersistenceState::Committed);
        register(&mut m, &p2, PersistenceState::Committed);
        link_to_many(&mut m, &schema, &a, "paintings", &p1);
        link_to_many(&mut m, &schema, &a, "paintings", &p2);

        assert!(perform_delete(&mut m, &schema, &a).unwrap());
        assert_eq!(m.get_node(&a).unwrap().state(), PersistenceState::Deleted);
        assert_eq!(m.get_node(&p1).unwrap().state(), PersistenceState::Deleted);
        assert_eq!(m.get_node(&p2).unwrap().state(), PersistenceState::Deleted);
    }

    #[test]
    fn cascade_tolerates_unmaterialized_target() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let (a, p) = (artist(), painting(1));
        register(&mut m, &a, PersistenceState::Committed);
        // Painting id is referenced but never registered.
        m.node_mut(&a).unwrap().add_to_many("paintings", p);

        assert!(perform_delete(&mut m, &schema, &a).unwrap());
        assert_eq!(m.get_node(&a).unwrap().state(), PersistenceState::Deleted);
    }

    #[test]
    fn deny_fails_and_restores_state() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let (g, p) = (gallery(), painting(1));
        register(&mut m, &g, PersistenceState::Committed);
        register(&mut m, &p, PersistenceState::Committed);
        link_to_many(&mut m, &schema, &g, "paintings", &p);
        // Finalize the fixture so the pre-delete state really is Committed.
        m.graph_committed();
        let ops_before = m.diffs().len();

        let err = perform_delete(&mut m, &schema, &g).unwrap_err();
        assert!(matches!(err, GraphError::DeleteDenied { .. }));
        assert_eq!(m.get_node(&g).unwrap().state(), PersistenceState::Committed);
        assert_eq!(m.get_node(&p).unwrap().to_one("gallery"), Some(g.clone()));
        assert_eq!(m.diffs().len(), ops_before);
    }

    #[test]
    fn deny_deep_in_cascade_reverts_only_the_root() {
        // Region cascades to Artist cascades to Painting, and the painting
        // still has reproductions behind a DENY rule.
        let schema = Schema::builder()
            .entity("Region", |e| {
                e.to_many("artists", "Artist", Some("region"), DeleteRule::Cascade)
            })
            .entity("Artist", |e| {
                e.to_one("region", "Region", Some("artists"), DeleteRule::NoAction)
                    .to_many("paintings", "Painting", Some("artist"), DeleteRule::Cascade)
            })
            .entity("Painting", |e| {
                e.to_one("artist", "Artist", Some("paintings"), DeleteRule::NoAction)
                    .to_many(
                        "reproductions",
                        "Reproduction",
                        Some("painting"),
                        DeleteRule::Deny,
                    )
            })
            .entity("Reproduction", |e| {
                e.to_one("painting", "Painting", Some("reproductions"), DeleteRule::NoAction)
            })
            .build();

        let mut m = GraphManager::new(false, false);
        let r = Identity::permanent("Region", "id", 1);
        let a = artist();
        let p = painting(1);
        let x = Identity::permanent("Reproduction", "id", 1);
        for id in [&r, &a, &p, &x] {
            register(&mut m, id, PersistenceState::Committed);
        }
        link_to_many(&mut m, &schema, &r, "artists", &a);
        link_to_many(&mut m, &schema, &a, "paintings", &p);
        link_to_many(&mut m, &schema, &p, "reproductions", &x);
        // Finalize the fixture so the pre-delete states really are Committed.
        m.graph_committed();

        let err = perform_delete(&mut m, &schema, &r).unwrap_err();
        assert!(matches!(err, GraphError::DeleteDenied { .. }));

        // Only the root comes back; the intermediate cascade step stays
        // deleted until rollback.
        assert_eq!(m.get_node(&r).unwrap().state(), PersistenceState::Committed);
        assert_eq!(m.get_node(&a).unwrap().state(), PersistenceState::Deleted);
        // The denied node itself was never touched.
        assert_eq!(m.get_node(&p).unwrap().state(), PersistenceState::Committed);
        assert_eq!(m.get_node(&x).unwrap().state(), PersistenceState::Committed);
    }

    #[test]
    fn deny_passes_once_relationship_is_empty() {
        let schema = schema();
        let mut m = GraphManager::new(false, false);
        let g = gallery();
        register(&mut m, &g, PersistenceState::Committed);

        assert!(perform_delete(&mut m, &schema, &g).unwrap());
        assert_eq!(m.get_node(&g).unwrap().state(), PersistenceState::Deleted);
    }
}
