use quarry::compile::{AliasContext, CompileError, RelationPlanner};
use quarry::plan::expr::{alias_col, and, eq, lit_str, Expr, Literal};
use quarry::plan::query::JoinKind;
use quarry::schema::{SchemaDocument, SchemaRegistry};
use serde_json::json;

fn crm_registry() -> SchemaRegistry {
    let doc = SchemaDocument::from_value(json!({
        "Account": {
            "fields": {
                "id": {"type": "id"},
                "name": {"type": "varchar", "len": 249}
            },
            "relations": {
                "emailAddresses": {
                    "type": "manyMany",
                    "entity": "EmailAddress",
                    "relationName": "EntityEmailAddress",
                    "midKeys": ["entityId", "emailAddressId"],
                    "conditions": {"entityType": "Account"}
                },
                "contacts": {"type": "hasMany", "entity": "Contact", "foreign": "account"},
                "emails": {"type": "hasChildren", "entity": "Email", "foreign": "parent"}
            }
        },
        "Contact": {
            "fields": {
                "id": {"type": "id"},
                "lastName": {"type": "varchar"},
                "accountId": {"type": "foreignId"}
            },
            "relations": {
                "account": {"type": "belongsTo", "entity": "Account", "key": "accountId"},
                "emails": {"type": "hasChildren", "entity": "Email", "foreign": "parent"}
            }
        },
        "Email": {
            "fields": {
                "id": {"type": "id"},
                "subject": {"type": "varchar"},
                "parentId": {"type": "foreignId"},
                "parentType": {"type": "foreignType"}
            },
            "relations": {"parent": {"type": "belongsToParent"}}
        },
        "EmailAddress": {
            "fields": {"id": {"type": "id"}, "name": {"type": "varchar"}}
        }
    }))
    .unwrap();
    SchemaRegistry::load(doc).unwrap()
}

#[test]
fn belongs_to_is_single_left_join() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("contact");

    let spec = planner.plan("Contact", "account", &ctx).unwrap();
    assert_eq!(spec.target_alias, "account");
    assert!(!spec.many);
    assert_eq!(spec.joins.len(), 1);

    let join = &spec.joins[0];
    assert_eq!(join.kind, JoinKind::Left);
    assert_eq!(join.target, "Account");
    assert_eq!(join.alias, "account");
    assert_eq!(join.source_alias, "contact");
    assert_eq!(
        join.on,
        eq(alias_col("account", "id"), alias_col("contact", "accountId"))
    );
}

#[test]
fn has_many_joins_on_base_id() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let spec = planner.plan("Account", "contacts", &ctx).unwrap();
    assert!(spec.many);
    assert_eq!(spec.joins.len(), 1);
    assert_eq!(
        spec.joins[0].on,
        eq(
            alias_col("contacts", "accountId"),
            alias_col("account", "id")
        )
    );
}

#[test]
fn many_many_joins_junction_then_target() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let spec = planner.plan("Account", "emailAddresses", &ctx).unwrap();
    assert!(spec.many);
    assert_eq!(spec.target_alias, "emailAddresses");
    assert_eq!(
        spec.junction_alias.as_deref(),
        Some("emailAddressesMiddle")
    );
    assert_eq!(spec.joins.len(), 2);

    // The junction carries the near key and the static discriminator in
    // its ON clause, not in WHERE.
    let junction = &spec.joins[0];
    assert_eq!(junction.target, "EntityEmailAddress");
    assert_eq!(junction.alias, "emailAddressesMiddle");
    assert_eq!(
        junction.on,
        and(vec![
            eq(
                alias_col("emailAddressesMiddle", "entityId"),
                alias_col("account", "id")
            ),
            eq(
                alias_col("emailAddressesMiddle", "entityType"),
                lit_str("Account")
            ),
        ])
    );

    let target = &spec.joins[1];
    assert_eq!(target.target, "EmailAddress");
    assert_eq!(target.source_alias, "emailAddressesMiddle");
    assert_eq!(
        target.on,
        eq(
            alias_col("emailAddresses", "id"),
            alias_col("emailAddressesMiddle", "emailAddressId")
        )
    );
}

#[test]
fn alias_override_and_extra_conditions() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let spec = planner
        .plan_with(
            "Account",
            "emailAddresses",
            &ctx,
            Some("primaryAddress"),
            JoinKind::Left,
            &[("primary".to_string(), Literal::Bool(true))],
        )
        .unwrap();

    assert_eq!(spec.target_alias, "primaryAddress");
    assert_eq!(spec.junction_alias.as_deref(), Some("primaryAddressMiddle"));

    // Extra conditions land on the junction, after the discriminators.
    match &spec.joins[0].on {
        Expr::And(parts) => {
            assert_eq!(parts.len(), 3);
            assert_eq!(
                parts[2],
                eq(
                    alias_col("primaryAddressMiddle", "primary"),
                    Expr::Literal(Literal::Bool(true))
                )
            );
        }
        other => panic!("unexpected ON clause: {other:?}"),
    }
}

#[test]
fn polymorphic_parent_emits_one_join_per_candidate() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("email");

    let spec = planner.plan("Email", "parent", &ctx).unwrap();
    assert!(!spec.many);
    assert_eq!(spec.joins.len(), 2);

    let account = &spec.joins[0];
    assert_eq!(account.target, "Account");
    assert_eq!(account.alias, "parentAccount");
    assert_eq!(
        account.on,
        and(vec![
            eq(
                alias_col("parentAccount", "id"),
                alias_col("email", "parentId")
            ),
            eq(alias_col("email", "parentType"), lit_str("Account")),
        ])
    );

    assert_eq!(spec.joins[1].target, "Contact");
    assert_eq!(spec.joins[1].alias, "parentContact");
}

#[test]
fn parent_join_for_known_type() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("email");

    let spec = planner
        .plan_for_type("Email", "parent", "Account", &ctx)
        .unwrap();
    assert_eq!(spec.joins.len(), 1);
    assert_eq!(spec.joins[0].target, "Account");
    assert_eq!(spec.joins[0].alias, "parent");
}

#[test]
fn parent_join_rejects_unknown_type() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("email");

    let err = planner
        .plan_for_type("Email", "parent", "Team", &ctx)
        .unwrap_err();
    assert!(matches!(err, CompileError::InvalidParentType { .. }));
}

#[test]
fn has_children_filters_on_type_column() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let spec = planner.plan("Account", "emails", &ctx).unwrap();
    assert!(spec.many);
    assert_eq!(
        spec.joins[0].on,
        and(vec![
            eq(alias_col("emails", "parentId"), alias_col("account", "id")),
            eq(alias_col("emails", "parentType"), lit_str("Account")),
        ])
    );
}

#[test]
fn alias_equal_to_base_is_rejected() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let err = planner
        .plan_with(
            "Account",
            "contacts",
            &ctx,
            Some("account"),
            JoinKind::Left,
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::AmbiguousJoinAlias { .. }));
}

#[test]
fn unknown_relation_is_an_error() {
    let registry = crm_registry();
    let planner = RelationPlanner::new(&registry);
    let ctx = AliasContext::new("account");

    let err = planner.plan("Account", "nothing", &ctx).unwrap_err();
    assert!(matches!(err, CompileError::UnknownRelation { .. }));
}
