use quarry::plan::query::{Direction, JoinKind};
use quarry::schema::{
    AliasSpec, AttributeRole, AttributeType, Operator, PolyRole, Relation, SchemaDocument,
    SchemaError, SchemaRegistry, StorageKind,
};
use serde_json::json;

/// A small CRM-flavored document exercising every relation shape and
/// override kind the loader understands.
fn crm_document() -> serde_json::Value {
    json!({
        "Account": {
            "fields": {
                "id": {"type": "id", "dbType": "varchar", "len": 24},
                "name": {"type": "varchar", "len": 249},
                "emailAddressIsOptedOut": {
                    "type": "bool",
                    "notStorable": true,
                    "where": {
                        "= TRUE": {
                            "leftJoins": [["emailAddresses", "emailAddresses", {"primary": true}]],
                            "whereClause": {"emailAddresses.optOut": true}
                        },
                        "= FALSE": {
                            "leftJoins": [["emailAddresses", "emailAddresses", {"primary": true}]],
                            "whereClause": {"OR": [
                                {"emailAddresses.optOut": false},
                                {"emailAddresses.optOut": null}
                            ]}
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
                "teams": {"type": "manyMany", "entity": "Team"},
                "contacts": {"type": "hasMany", "entity": "Contact", "foreign": "account"},
                "emails": {"type": "hasChildren", "entity": "Email", "foreign": "parent"}
            },
            "collection": {"orderBy": "name", "order": "ASC"}
        },
        "Contact": {
            "fields": {
                "id": {"type": "id"},
                "firstName": {"type": "varchar", "len": 100},
                "lastName": {"type": "varchar", "len": 100},
                "accountId": {"type": "foreignId"},
                "accountName": {"type": "foreign", "relation": "account", "foreign": "name"}
            },
            "relations": {
                "account": {"type": "belongsTo", "entity": "Account", "key": "accountId"},
                "emails": {"type": "hasChildren", "entity": "Email", "foreign": "parent"}
            }
        },
        "Email": {
            "fields": {
                "id": {"type": "id"},
                "subject": {"type": "varchar", "len": 255},
                "dateSent": {"type": "datetime"},
                "parentId": {"type": "foreignId"},
                "parentType": {"type": "foreignType"}
            },
            "relations": {
                "parent": {"type": "belongsToParent"}
            },
            "additionalTables": {
                "EmailEmailAddress": {
                    "fields": {
                        "id": {"type": "id"},
                        "emailId": {"type": "foreignId"},
                        "emailAddressId": {"type": "foreignId"},
                        "addressType": {"type": "varchar", "len": 4}
                    }
                }
            },
            "collection": {"orderBy": "dateSent", "order": "DESC"}
        },
        "EmailAddress": {
            "fields": {
                "id": {"type": "id"},
                "name": {"type": "varchar", "len": 255},
                "lower": {"type": "varchar", "len": 255},
                "optOut": {"type": "bool"},
                "invalid": {"type": "bool"}
            },
            "indexes": {
                "lower": {"columns": ["lower"], "type": "unique"},
                "name": {"columns": ["name"]}
            }
        },
        "Team": {
            "fields": {"id": {"type": "id"}, "name": {"type": "varchar", "len": 100}}
        },
        "Opportunity": {
            "fields": {
                "id": {"type": "id"},
                "name": {"type": "varchar", "len": 249},
                "amount": {"type": "float", "attributeRole": "value"},
                "amountCurrency": {"type": "varchar", "len": 3, "attributeRole": "currency"},
                "amountConverted": {
                    "type": "float",
                    "notStorable": true,
                    "attributeRole": "valueConverted"
                }
            },
            "relations": {
                "emails": {"type": "hasChildren", "entity": "Email", "foreign": "parent"}
            }
        }
    })
}

fn load(value: serde_json::Value) -> Result<SchemaRegistry, SchemaError> {
    SchemaRegistry::load(SchemaDocument::from_value(value).unwrap())
}

fn crm_registry() -> SchemaRegistry {
    load(crm_document()).unwrap()
}

#[test]
fn loads_crm_document() {
    let registry = crm_registry();
    let account = registry.get("Account").unwrap();
    assert_eq!(account.name, "Account");
    assert!(account.attribute("name").is_some());
    assert!(account.relation("emailAddresses").is_some());
}

#[test]
fn unknown_entity_lookup_fails() {
    let registry = crm_registry();
    let err = registry.get("Nope").unwrap_err();
    assert!(matches!(err, SchemaError::NotFound { .. }));
}

#[test]
fn storage_classification() {
    let registry = crm_registry();
    let account = registry.get("Account").unwrap();

    // Physical column.
    let name = account.attribute("name").unwrap();
    assert_eq!(name.storage, StorageKind::Physical);
    assert_eq!(name.attr_type, AttributeType::Varchar);

    // notStorable with an override table is computed.
    let opted_out = account.attribute("emailAddressIsOptedOut").unwrap();
    assert_eq!(opted_out.storage, StorageKind::Virtual);

    // notStorable without any machinery is schema-only.
    let ids = account.attribute("teamsIds").unwrap();
    assert_eq!(ids.storage, StorageKind::NotStorable);
    assert_eq!(ids.role, Some(AttributeRole::IdList));

    // Foreign projections are computed by nature.
    let contact = registry.get("Contact").unwrap();
    let account_name = contact.attribute("accountName").unwrap();
    assert_eq!(account_name.storage, StorageKind::Virtual);
}

#[test]
fn override_table_is_lowered_per_operator() {
    let registry = crm_registry();
    let account = registry.get("Account").unwrap();
    let attr = account.attribute("emailAddressIsOptedOut").unwrap();

    assert!(attr.has_where_overrides());
    let on_true = attr.where_override(Operator::IsTrue).unwrap();
    assert_eq!(on_true.joins.len(), 1);
    assert_eq!(on_true.joins[0].relation, "emailAddresses");
    assert_eq!(on_true.joins[0].kind, JoinKind::Left);
    assert_eq!(
        on_true.joins[0].alias,
        AliasSpec::Fixed("emailAddresses".to_string())
    );
    assert!(!on_true.joins[0].conditions.is_empty());

    // Operators outside the table are absent, not defaulted.
    assert!(attr.where_override(Operator::Gt).is_none());
}

#[test]
fn many_many_defaults_are_derived() {
    let registry = crm_registry();
    let account = registry.get("Account").unwrap();

    // relationName and midKeys omitted: derived from the entity pair.
    match account.relation("teams").unwrap() {
        Relation::ManyMany {
            junction, mid_keys, ..
        } => {
            assert_eq!(junction, "AccountTeam");
            assert_eq!(mid_keys, &["accountId".to_string(), "teamId".to_string()]);
        }
        other => panic!("unexpected relation: {other:?}"),
    }

    // Explicit names pass through.
    match account.relation("emailAddresses").unwrap() {
        Relation::ManyMany {
            junction, mid_keys, ..
        } => {
            assert_eq!(junction, "EntityEmailAddress");
            assert_eq!(
                mid_keys,
                &["entityId".to_string(), "emailAddressId".to_string()]
            );
        }
        other => panic!("unexpected relation: {other:?}"),
    }
}

#[test]
fn parent_candidates_come_from_has_children_declarations() {
    let registry = crm_registry();
    let email = registry.get("Email").unwrap();
    match email.relation("parent").unwrap() {
        Relation::Polymorphic {
            role: PolyRole::Parent,
            candidates,
            id_column,
            type_column,
            ..
        } => {
            assert_eq!(candidates, &["Account", "Contact", "Opportunity"]);
            assert_eq!(id_column, "parentId");
            assert_eq!(type_column, "parentType");
        }
        other => panic!("unexpected relation: {other:?}"),
    }
}

#[test]
fn additional_tables_are_registered() {
    let registry = crm_registry();
    let junction = registry.get("EmailEmailAddress").unwrap();
    assert!(junction.attribute("addressType").is_some());
}

#[test]
fn collection_order_is_lowered() {
    let registry = crm_registry();
    let email = registry.get("Email").unwrap();
    let collection = email.collection.as_ref().unwrap();
    assert_eq!(collection.order_by, "dateSent");
    assert_eq!(collection.direction, Direction::Desc);
}

#[test]
fn unknown_attribute_type_fails_load() {
    let err = load(json!({
        "Thing": {"fields": {"id": {"type": "id"}, "blob": {"type": "blob"}}}
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownAttributeType { .. }));
}

#[test]
fn unknown_operator_key_fails_load() {
    let err = load(json!({
        "Thing": {"fields": {
            "id": {"type": "id"},
            "flag": {"type": "bool", "notStorable": true, "where": {
                "~=": {"whereClause": {"flag": true}}
            }}
        }}
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownOperator { .. }));
}

#[test]
fn override_without_clause_fails_load() {
    let err = load(json!({
        "Thing": {"fields": {
            "id": {"type": "id"},
            "flag": {"type": "bool", "notStorable": true, "where": {
                "= TRUE": {"leftJoins": ["other"]}
            }}
        }}
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::MissingWhereClause { .. }));
}

#[test]
fn relation_to_unregistered_entity_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {"id": {"type": "id"}, "otherId": {"type": "foreignId"}},
            "relations": {"other": {"type": "belongsTo", "entity": "Other", "key": "otherId"}}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownRelationTarget { .. }));
}

#[test]
fn non_key_relation_column_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {"id": {"type": "id"}, "otherId": {"type": "varchar"}},
            "relations": {"other": {"type": "belongsTo", "entity": "Thing", "key": "otherId"}}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::BadRelationKey { .. }));
}

#[test]
fn id_list_without_name_map_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {
                "id": {"type": "id"},
                "tagsIds": {"type": "jsonArray", "notStorable": true, "attributeRole": "idList"}
            }
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::IncompleteComposite { .. }));
}

#[test]
fn value_converted_without_companions_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {
                "id": {"type": "id"},
                "amountConverted": {
                    "type": "float", "notStorable": true, "attributeRole": "valueConverted"
                }
            }
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::IncompleteComposite { .. }));
}

#[test]
fn unknown_index_column_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {"id": {"type": "id"}},
            "indexes": {"missing": {"columns": ["nope"]}}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownIndexColumn { .. }));
}

#[test]
fn unknown_index_kind_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {"id": {"type": "id"}, "name": {"type": "varchar", "len": 50}},
            "indexes": {"name": {"type": "spatial", "columns": ["name"]}}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownIndexKind { ref got, .. } if got == "spatial"));
}

#[test]
fn mid_keys_arity_fails_load() {
    let err = load(json!({
        "Thing": {
            "fields": {"id": {"type": "id"}},
            "relations": {
                "others": {
                    "type": "manyMany",
                    "entity": "Other",
                    "relationName": "OtherThing",
                    "midKeys": ["thingId", "otherId", "extraId"]
                }
            }
        },
        "Other": {
            "fields": {"id": {"type": "id"}}
        }
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::BadMidKeys { got: 3, .. }));
}

#[test]
fn bad_select_expression_fails_load() {
    let err = load(json!({
        "Thing": {"fields": {
            "id": {"type": "id"},
            "computed": {"type": "varchar", "notStorable": true,
                "select": {"select": "SLEEP(1)"}}
        }}
    }))
    .unwrap_err();
    assert!(matches!(err, SchemaError::BadExpression { .. }));
}
