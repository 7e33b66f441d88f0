use quarry::compile::{AliasContext, CompileError, PredicateTranslator};
use quarry::plan::expr::{
    alias_col, and, col, concat, eq, in_list, is_not_null, is_null, like, lit_str, lower,
    not_in_list, not_in_subquery, or, Expr, Literal,
};
use quarry::plan::query::SubPlan;
use quarry::schema::{Operator, SchemaDocument, SchemaRegistry};
use serde_json::json;

fn crm_registry() -> SchemaRegistry {
    let doc = SchemaDocument::from_value(json!({
        "Account": {
            "fields": {
                "id": {"type": "id"},
                "name": {"type": "varchar", "len": 249},
                "deleted": {"type": "bool"},
                "emailAddressIsOptedOut": {
                    "type": "bool",
                    "notStorable": true,
                    "where": {
                        "= TRUE": {
                            "leftJoins": ["emailAddresses"],
                            "whereClause": {"emailAddresses.optOut": true},
                            "distinct": true
                        },
                        "= FALSE": {
                            "leftJoins": ["emailAddresses"],
                            "whereClause": {"OR": [
                                {"emailAddresses.optOut": false},
                                {"emailAddresses.optOut": null}
                            ]},
                            "distinct": true
                        }
                    }
                },
                "notInTeamId": {
                    "type": "varchar",
                    "notStorable": true,
                    "where": {
                        "=": {
                            "whereClause": {"id!=s": {
                                "from": "EntityTeam",
                                "select": "entityId",
                                "whereClause": {"teamId": "{value}"}
                            }}
                        }
                    }
                },
                "teamsIds": {
                    "type": "jsonArray",
                    "notStorable": true,
                    "attributeRole": "idList",
                    "relation": "teams"
                },
                "teamsNames": {
                    "type": "jsonObject",
                    "notStorable": true,
                    "attributeRole": "nameMap"
                }
            },
            "relations": {
                "emailAddresses": {
                    "type": "manyMany",
                    "entity": "EmailAddress",
                    "relationName": "EntityEmailAddress",
                    "midKeys": ["entityId", "emailAddressId"],
                    "conditions": {"entityType": "Account"}
                },
                "teams": {
                    "type": "manyMany",
                    "entity": "Team",
                    "relationName": "EntityTeam",
                    "midKeys": ["entityId", "teamId"]
                }
            }
        },
        "Contact": {
            "fields": {
                "id": {"type": "id"},
                "firstName": {"type": "varchar", "len": 100},
                "lastName": {"type": "varchar", "len": 100},
                "name": {
                    "type": "varchar",
                    "notStorable": true,
                    "where": {
                        "=": {"whereClause": {"OR": [
                            {"firstName": "{value}"},
                            {"lastName": "{value}"},
                            {"CONCAT(firstName, ' ', lastName)": "{value}"},
                            {"CONCAT(lastName, ' ', firstName)": "{value}"}
                        ]}}
                    }
                }
            }
        },
        "EmailAddress": {
            "fields": {
                "id": {"type": "id"},
                "name": {
                    "type": "varchar",
                    "len": 255,
                    "where": {
                        "LIKE": {"whereClause": {"LOWER(name)*": "{value}"}}
                    }
                },
                "optOut": {"type": "bool"}
            }
        },
        "Team": {
            "fields": {"id": {"type": "id"}, "name": {"type": "varchar", "len": 100}}
        },
        "Email": {
            "fields": {
                "id": {"type": "id"},
                "subject": {"type": "varchar", "len": 255},
                "toEmailAddressIds": {
                    "type": "jsonArray",
                    "notStorable": true,
                    "attributeRole": "idList",
                    "relation": "toEmailAddresses"
                },
                "toEmailAddressNames": {
                    "type": "jsonObject",
                    "notStorable": true,
                    "attributeRole": "nameMap"
                },
                "ccEmailAddressIds": {
                    "type": "jsonArray",
                    "notStorable": true,
                    "attributeRole": "idList",
                    "relation": "ccEmailAddresses"
                },
                "ccEmailAddressNames": {
                    "type": "jsonObject",
                    "notStorable": true,
                    "attributeRole": "nameMap"
                }
            },
            "relations": {
                "toEmailAddresses": {
                    "type": "manyMany",
                    "entity": "EmailAddress",
                    "relationName": "EmailEmailAddress",
                    "midKeys": ["emailId", "emailAddressId"],
                    "conditions": {"addressType": "to"}
                },
                "ccEmailAddresses": {
                    "type": "manyMany",
                    "entity": "EmailAddress",
                    "relationName": "EmailEmailAddress",
                    "midKeys": ["emailId", "emailAddressId"],
                    "conditions": {"addressType": "cc"}
                }
            }
        }
    }))
    .unwrap();
    SchemaRegistry::load(doc).unwrap()
}

#[test]
fn equality_on_plain_column() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate("Account", "name", Operator::Eq, &json!("Acme"), &ctx)
        .unwrap();
    assert_eq!(p.expr, eq(alias_col("account", "name"), lit_str("Acme")));
    assert!(p.joins.is_empty());
    assert!(!p.distinct);
}

#[test]
fn null_equality_becomes_is_null() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate("Account", "name", Operator::Eq, &json!(null), &ctx)
        .unwrap();
    assert_eq!(p.expr, is_null(alias_col("account", "name")));

    let p = translator
        .translate("Account", "name", Operator::Ne, &json!(null), &ctx)
        .unwrap();
    assert_eq!(p.expr, is_not_null(alias_col("account", "name")));
}

#[test]
fn array_value_distributes_to_in_list() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate("Account", "name", Operator::In, &json!(["a", "b"]), &ctx)
        .unwrap();
    assert_eq!(
        p.expr,
        in_list(alias_col("account", "name"), vec![lit_str("a"), lit_str("b")])
    );

    let p = translator
        .translate("Account", "name", Operator::NotIn, &json!(["a"]), &ctx)
        .unwrap();
    assert_eq!(
        p.expr,
        not_in_list(alias_col("account", "name"), vec![lit_str("a")])
    );
}

#[test]
fn boolean_false_is_asymmetric() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    // TRUE is a plain equality.
    let p = translator
        .translate("Account", "deleted", Operator::IsTrue, &json!(true), &ctx)
        .unwrap();
    assert_eq!(
        p.expr,
        eq(
            alias_col("account", "deleted"),
            Expr::Literal(Literal::Bool(true))
        )
    );

    // FALSE also keeps rows where the flag was never set.
    let p = translator
        .translate("Account", "deleted", Operator::IsFalse, &json!(false), &ctx)
        .unwrap();
    assert_eq!(
        p.expr,
        or(vec![
            eq(
                alias_col("account", "deleted"),
                Expr::Literal(Literal::Bool(false))
            ),
            is_null(alias_col("account", "deleted")),
        ])
    );
}

#[test]
fn overridden_true_instantiates_template() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate(
            "Account",
            "emailAddressIsOptedOut",
            Operator::IsTrue,
            &json!(true),
            &ctx,
        )
        .unwrap();
    assert_eq!(
        p.expr,
        eq(
            alias_col("emailAddresses", "optOut"),
            Expr::Literal(Literal::Bool(true))
        )
    );
    assert!(p.distinct);
    assert_eq!(p.joins.len(), 2);
    assert_eq!(p.joins[0].alias, "emailAddressesMiddle");
    assert_eq!(p.joins[1].alias, "emailAddresses");
}

#[test]
fn overridden_false_keeps_unset_rows() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate(
            "Account",
            "emailAddressIsOptedOut",
            Operator::IsFalse,
            &json!(false),
            &ctx,
        )
        .unwrap();
    assert_eq!(
        p.expr,
        or(vec![
            eq(
                alias_col("emailAddresses", "optOut"),
                Expr::Literal(Literal::Bool(false))
            ),
            is_null(alias_col("emailAddresses", "optOut")),
        ])
    );
}

#[test]
fn override_without_operator_entry_is_rejected() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let err = translator
        .translate(
            "Account",
            "emailAddressIsOptedOut",
            Operator::Gt,
            &json!(true),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperator { .. }));
}

#[test]
fn person_name_equality_tries_every_name_ordering() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("contact");

    let p = translator
        .translate("Contact", "name", Operator::Eq, &json!("Ada Lovelace"), &ctx)
        .unwrap();
    let value = lit_str("Ada Lovelace");
    assert_eq!(
        p.expr,
        or(vec![
            eq(col("firstName"), value.clone()),
            eq(col("lastName"), value.clone()),
            eq(
                concat(vec![col("firstName"), lit_str(" "), col("lastName")]),
                value.clone(),
            ),
            eq(
                concat(vec![col("lastName"), lit_str(" "), col("firstName")]),
                value,
            ),
        ])
    );
    assert!(p.joins.is_empty());
}

#[test]
fn like_template_on_lowered_column_folds_the_pattern() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("emailAddress");

    let p = translator
        .translate(
            "EmailAddress",
            "name",
            Operator::Like,
            &json!("Foo%"),
            &ctx,
        )
        .unwrap();
    assert_eq!(p.expr, like(lower(col("name")), lit_str("foo%")));
}

#[test]
fn subquery_template_translates_to_anti_join() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let p = translator
        .translate("Account", "notInTeamId", Operator::Eq, &json!("t1"), &ctx)
        .unwrap();
    assert_eq!(
        p.expr,
        not_in_subquery(
            col("id"),
            SubPlan::new("EntityTeam", "entityId")
                .with_where(eq(col("teamId"), lit_str("t1"))),
        )
    );
    assert!(p.joins.is_empty());
}

#[test]
fn link_any_match_joins_junction_and_deduplicates() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("email");

    let p = translator
        .translate(
            "Email",
            "toEmailAddressIds",
            Operator::Eq,
            &json!("ea1"),
            &ctx,
        )
        .unwrap();

    assert!(p.distinct);
    // Only the junction is joined; the target table is not needed for an
    // id comparison.
    assert_eq!(p.joins.len(), 1);
    let junction = &p.joins[0];
    assert_eq!(junction.target, "EmailEmailAddress");
    assert_eq!(junction.alias, "toEmailAddressesMiddle");
    assert_eq!(
        junction.on,
        and(vec![
            eq(
                alias_col("toEmailAddressesMiddle", "emailId"),
                alias_col("email", "id")
            ),
            eq(
                alias_col("toEmailAddressesMiddle", "addressType"),
                lit_str("to")
            ),
        ])
    );
    assert_eq!(
        p.expr,
        eq(
            alias_col("toEmailAddressesMiddle", "emailAddressId"),
            lit_str("ea1")
        )
    );
}

#[test]
fn link_no_match_compiles_to_anti_join() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("email");

    let p = translator
        .translate(
            "Email",
            "ccEmailAddressIds",
            Operator::NotIn,
            &json!(["ea1", "ea2"]),
            &ctx,
        )
        .unwrap();

    // No join: a row linked to both a listed and an unlisted address
    // must not survive through a join row.
    assert!(p.joins.is_empty());
    assert!(!p.distinct);
    assert_eq!(
        p.expr,
        not_in_subquery(
            alias_col("email", "id"),
            SubPlan::new("EmailEmailAddress", "emailId").with_where(and(vec![
                eq(col("addressType"), lit_str("cc")),
                in_list(
                    col("emailAddressId"),
                    vec![lit_str("ea1"), lit_str("ea2")]
                ),
            ])),
        )
    );
}

#[test]
fn link_is_null_means_no_links_at_all() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("email");

    let p = translator
        .translate(
            "Email",
            "toEmailAddressIds",
            Operator::IsNull,
            &json!(null),
            &ctx,
        )
        .unwrap();
    assert!(p.joins.is_empty());
    assert_eq!(
        p.expr,
        not_in_subquery(
            alias_col("email", "id"),
            SubPlan::new("EmailEmailAddress", "emailId")
                .with_where(eq(col("addressType"), lit_str("to"))),
        )
    );
}

#[test]
fn link_is_not_null_means_any_link() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("email");

    let p = translator
        .translate(
            "Email",
            "toEmailAddressIds",
            Operator::IsNotNull,
            &json!(null),
            &ctx,
        )
        .unwrap();
    assert!(p.distinct);
    assert_eq!(
        p.expr,
        is_not_null(alias_col("toEmailAddressesMiddle", "emailAddressId"))
    );
}

#[test]
fn link_rejects_range_operators() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("email");

    let err = translator
        .translate(
            "Email",
            "toEmailAddressIds",
            Operator::Gt,
            &json!("ea1"),
            &ctx,
        )
        .unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedOperator { .. }));
}

#[test]
fn like_on_non_string_value_is_rejected() {
    let registry = crm_registry();
    let translator = PredicateTranslator::new(&registry);
    let ctx = AliasContext::new("account");

    let err = translator
        .translate("Account", "name", Operator::Like, &json!(5), &ctx)
        .unwrap_err();
    assert!(matches!(err, CompileError::BadValue { .. }));
}
