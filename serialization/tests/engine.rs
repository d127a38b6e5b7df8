mod common;

use std::sync::{Arc, Mutex};

use common::*;
use formloom_codemodel::{BinaryOperator, Expression, Statement, Value};
use formloom_model::MemberRelationship;
use formloom_serialization::serializers::{interpreter, GenericObjectSerializer, TypeLevelSerializer};
use formloom_serialization::{
    SerializationError, SerializationManager, SerializerEntry, SerializerKind, SessionEvent,
    SessionOptions, INITIALIZE_METHOD,
};

fn init_statements(decl: &formloom_codemodel::TypeDecl) -> &[Statement] {
    &decl
        .method(INITIALIZE_METHOD)
        .expect("synthesized init method")
        .statements
}

fn count_constructions(statements: &[Statement], type_name: &str) -> usize {
    statements
        .iter()
        .filter(|s| {
            matches!(
                s,
                Statement::Assign {
                    right: Expression::ObjectCreate { type_name: tn, .. },
                    ..
                } if tn == type_name
            )
        })
        .count()
}

fn find_property_assign<'a>(statements: &'a [Statement], property: &str) -> Option<&'a Statement> {
    statements.iter().find(|s| {
        matches!(
            s,
            Statement::Assign {
                left: Expression::PropertyRef { property: p, .. },
                ..
            } if p == property
        )
    })
}

// ---------------------------------------------------------------------------
// Round trip: serialize a surface, reconstruct it, compare by value
// ---------------------------------------------------------------------------

#[test]
fn round_trip_primitive_and_flag_properties() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);

    let widget = instantiate(&env, "Widget");
    edit_widget(&widget, |w| {
        w.label = "OK".to_owned();
        w.width = 40;
        w.anchors = ANCHOR_TOP | ANCHOR_LEFT;
    });
    env.container.add(widget, Some("button1"), false).unwrap();

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).expect("root serializes");
    let errors = session.close();
    assert!(errors.is_empty(), "unexpected diagnostics: {errors:?}");

    assert_eq!(decl.base_type, "Form");
    assert_eq!(decl.name, "form1");
    assert_eq!(decl.fields.len(), 1);
    assert_eq!(decl.fields[0].name, "button1");
    assert_eq!(decl.fields[0].type_name, "Widget");

    let statements = init_statements(&decl);
    // The construction assignment precedes every property statement.
    assert!(matches!(
        &statements[0],
        Statement::Assign {
            right: Expression::ObjectCreate { type_name, .. },
            ..
        } if type_name == "Widget"
    ));

    // Reconstruct into a fresh surface.
    let env2 = fixture_environment();
    let manager2 = SerializationManager::new(env2.clone());
    let session2 = manager2.open_session().unwrap();
    let root = manager2.deserialize_root(&decl).expect("root deserializes");
    let errors = session2.close();
    assert!(errors.is_empty(), "unexpected diagnostics: {errors:?}");

    assert!(env2.container.root().unwrap().same_instance(&root));
    let restored = env2.container.get("button1").expect("widget reconstructed");
    let (label, width, visible, anchors) = widget_state(&restored);
    assert_eq!(label, "OK");
    assert_eq!(width, 40);
    assert!(!visible);
    assert_eq!(anchors, ANCHOR_TOP | ANCHOR_LEFT);
}

// ---------------------------------------------------------------------------
// Identity dedup: one construction, two references
// ---------------------------------------------------------------------------

#[test]
fn shared_reference_serializes_one_construction() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);

    let widget = instantiate(&env, "Widget");
    env.container.add(widget.clone(), Some("button1"), false).unwrap();
    edit_form(&form, |f| {
        f.primary = Some(widget.clone());
        f.secondary = Some(widget.clone());
    });

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    assert!(session.close().is_empty());

    let statements = init_statements(&decl);
    assert_eq!(count_constructions(statements, "Widget"), 1);

    let reference = Expression::field(Expression::SelfRef, "button1");
    for property in ["primary", "secondary"] {
        let assign = find_property_assign(statements, property)
            .unwrap_or_else(|| panic!("no assignment for '{property}'"));
        let Statement::Assign { right, .. } = assign else {
            unreachable!()
        };
        assert_eq!(right, &reference, "'{property}' should be a reference");
    }
}

// ---------------------------------------------------------------------------
// Flag enums: declared-order left-associative OR chains
// ---------------------------------------------------------------------------

#[test]
fn two_flag_value_serializes_as_binary_or() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);

    let widget = instantiate(&env, "Widget");
    edit_widget(&widget, |w| w.anchors = ANCHOR_TOP | ANCHOR_LEFT);
    env.container.add(widget, Some("button1"), false).unwrap();

    let manager = SerializationManager::new(env.clone());
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    assert!(session.close().is_empty());

    let assign = find_property_assign(init_statements(&decl), "anchors").expect("anchors assigned");
    let Statement::Assign { right, .. } = assign else {
        unreachable!()
    };
    let expected = Expression::bit_or(
        Expression::field(Expression::type_ref("Anchors"), "top"),
        Expression::field(Expression::type_ref("Anchors"), "left"),
    );
    assert_eq!(right, &expected);
    assert!(matches!(
        right,
        Expression::Binary {
            op: BinaryOperator::BitOr,
            ..
        }
    ));

    // Evaluating the expression reproduces the combined numeric value.
    let manager2 = SerializationManager::new(env);
    let session2 = manager2.open_session().unwrap();
    let value = interpreter::evaluate(&manager2, right);
    assert!(session2.close().is_empty());
    assert_eq!(value.as_flag_bits(), Some(ANCHOR_TOP | ANCHOR_LEFT));
    assert_eq!(value.type_name(), "Anchors");
}

// ---------------------------------------------------------------------------
// Collections: one add invocation per element, order preserved
// ---------------------------------------------------------------------------

#[test]
fn collection_round_trips_in_order() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);
    edit_form(&form, |f| {
        f.tags
            .downcast_with_mut(|t: &mut TagList| {
                t.items = vec!["alpha".into(), "beta".into(), "gamma".into()];
            })
            .expect("not a TagList");
    });

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    assert!(session.close().is_empty());

    let adds: Vec<&str> = init_statements(&decl)
        .iter()
        .filter_map(|s| match s {
            Statement::Expression(Expression::MethodInvoke { method, args, .. })
                if method == "add" =>
            {
                match args.as_slice() {
                    [Expression::Literal(Value::String(item))] => Some(item.as_str()),
                    _ => None,
                }
            }
            _ => None,
        })
        .collect();
    assert_eq!(adds, ["alpha", "beta", "gamma"]);

    let env2 = fixture_environment();
    let manager2 = SerializationManager::new(env2.clone());
    let session2 = manager2.open_session().unwrap();
    manager2.deserialize_root(&decl).unwrap();
    assert!(session2.close().is_empty());

    let restored = env2.container.get("form1").unwrap();
    assert_eq!(tag_items(&restored), ["alpha", "beta", "gamma"]);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn bound_event_round_trips_through_the_binding_service() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);
    let widget = instantiate(&env, "Widget");
    env.container.add(widget.clone(), Some("button1"), false).unwrap();
    env.events.bind(widget.id(), "clicked", Some("on_clicked".into()));

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    assert!(session.close().is_empty());

    let attach = init_statements(&decl)
        .iter()
        .find(|s| matches!(s, Statement::AttachEvent { .. }))
        .expect("attach statement");
    let Statement::AttachEvent { event, listener, .. } = attach else {
        unreachable!()
    };
    assert_eq!(event, "clicked");
    assert!(matches!(
        listener,
        Expression::Delegate { method, .. } if method == "on_clicked"
    ));

    let env2 = fixture_environment();
    let manager2 = SerializationManager::new(env2.clone());
    let session2 = manager2.open_session().unwrap();
    manager2.deserialize_root(&decl).unwrap();
    assert!(session2.close().is_empty());

    let restored = env2.container.get("button1").unwrap();
    assert_eq!(
        env2.events.handler_of(restored.id(), "clicked").as_deref(),
        Some("on_clicked")
    );
}

// ---------------------------------------------------------------------------
// Member relationships: linked properties become cross-references
// ---------------------------------------------------------------------------

#[test]
fn linked_members_serialize_as_cross_references() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);

    let first = instantiate(&env, "Widget");
    edit_widget(&first, |w| w.width = 30);
    env.container.add(first, Some("button1"), false).unwrap();

    let second = instantiate(&env, "Widget");
    env.container.add(second.clone(), Some("button2"), false).unwrap();
    env.relationships.set_relationship(
        second.id(),
        "width",
        Some(MemberRelationship {
            source: "button1".to_owned(),
            member: "width".to_owned(),
        }),
    );

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    assert!(session.close().is_empty());

    // button2's width is zero and would normally be skipped; the link both
    // forces serialization and replaces the value with a cross-reference.
    let expected = Statement::Assign {
        left: Expression::property(
            Expression::field(Expression::SelfRef, "button2"),
            "width",
        ),
        right: Expression::property(
            Expression::field(Expression::SelfRef, "button1"),
            "width",
        ),
    };
    assert!(
        init_statements(&decl).contains(&expected),
        "expected a cross-reference assignment for the linked member"
    );
}

// ---------------------------------------------------------------------------
// Name collisions
// ---------------------------------------------------------------------------

#[test]
fn set_name_rejects_rebinding() {
    let env = fixture_environment();
    let a = instantiate(&env, "Widget");
    let b = instantiate(&env, "Widget");

    let manager = SerializationManager::new(env);
    let _session = manager.open_session().unwrap();
    manager.set_name("x", &a).unwrap();
    manager.set_name("x", &a).unwrap(); // same instance is fine
    assert_eq!(
        manager.set_name("x", &b),
        Err(SerializationError::DuplicateName("x".into()))
    );
}

#[test]
fn collision_rename_is_reflected_in_the_name_map() {
    let env = fixture_environment();
    let existing = instantiate(&env, "Widget");
    env.container.add(existing.clone(), Some("button1"), false).unwrap();

    let manager = SerializationManager::new(env.clone());
    let _session = manager.open_session().unwrap();
    let ty = env.types.get("Widget").unwrap();
    let created = manager
        .create_instance(&ty, &[], Some("button1"), true)
        .unwrap();

    assert!(!created.same_instance(&existing));
    // The mapping reflects the name the container actually assigned.
    assert_eq!(manager.name_of(&created).unwrap().as_deref(), Some("button12"));
    let by_new_name = manager.instance_by_name("button12").unwrap().unwrap();
    assert!(by_new_name.same_instance(&created));
    // The requested name is redirected to the renamed instance.
    let by_old_name = manager.instance_by_name("button1").unwrap().unwrap();
    assert!(by_old_name.same_instance(&created));
}

// ---------------------------------------------------------------------------
// Partial failure: one bad property never blocks the rest
// ---------------------------------------------------------------------------

#[test]
fn missing_serializer_is_reported_and_skipped() {
    let env = fixture_environment();
    let form = instantiate(&env, "Form");
    env.container.add(form.clone(), Some("form1"), false).unwrap();
    env.container.set_root(&form);

    let widget = instantiate(&env, "Widget");
    let mystery = instantiate(&env, "Mystery");
    edit_widget(&widget, |w| {
        w.label = "still here".to_owned();
        w.mystery = Some(mystery);
    });
    env.container.add(widget, Some("button1"), false).unwrap();

    let manager = SerializationManager::new(env);
    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&form).unwrap();
    let errors = session.close();

    assert!(
        errors.iter().any(|e| matches!(
            e,
            SerializationError::MissingSerializer { type_name, .. } if type_name == "Mystery"
        )),
        "expected a missing-serializer diagnostic, got {errors:?}"
    );

    // Everything else still serialized.
    let statements = init_statements(&decl);
    assert_eq!(count_constructions(statements, "Widget"), 1);
    let label = find_property_assign(statements, "label").expect("label still serialized");
    assert!(matches!(
        label,
        Statement::Assign {
            right: Expression::Literal(Value::String(s)),
            ..
        } if s == "still here"
    ));
    assert!(find_property_assign(statements, "mystery").is_none());
}

// ---------------------------------------------------------------------------
// Session protocol
// ---------------------------------------------------------------------------

#[test]
fn one_session_at_a_time() {
    let env = fixture_environment();
    let manager = SerializationManager::new(env);

    let session = manager.open_session().unwrap();
    assert!(matches!(
        manager.open_session().err(),
        Some(SerializationError::SessionAlreadyOpen)
    ));
    assert!(matches!(
        manager.set_options(SessionOptions::default()).err(),
        Some(SerializationError::SessionAlreadyOpen)
    ));
    drop(session);

    // Closed: a new session opens, and options can change again.
    manager.set_options(SessionOptions::default()).unwrap();
    let _session = manager.open_session().unwrap();
}

#[test]
fn operations_outside_a_session_fail() {
    let env = fixture_environment();
    let widget = instantiate(&env, "Widget");
    let manager = SerializationManager::new(env);

    assert_eq!(
        manager.set_name("x", &widget),
        Err(SerializationError::NoActiveSession)
    );
    assert!(matches!(
        manager.diagnostics(),
        Err(SerializationError::NoActiveSession)
    ));
    assert!(matches!(
        manager.instance_by_name("x"),
        Err(SerializationError::NoActiveSession)
    ));
}

#[test]
fn session_notifications_fire_in_teardown_order() {
    let env = fixture_environment();
    let manager = SerializationManager::new(env);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    manager.subscribe_session(move |event| sink.lock().unwrap().push(event));

    let session = manager.open_session().unwrap();
    session.close();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            SessionEvent::Created,
            SessionEvent::Disposed,
            SessionEvent::SerializationComplete,
        ]
    );
}

// ---------------------------------------------------------------------------
// Registry overrides
// ---------------------------------------------------------------------------

#[test]
fn type_serializer_override_beats_the_provider_chain() {
    let env = fixture_environment();
    let mystery_ty = env.types.get("Mystery").unwrap();
    let manager = SerializationManager::new(env);

    {
        let _session = manager.open_session().unwrap();
        assert!(manager
            .serializer_for(&mystery_ty, SerializerKind::Object)
            .unwrap()
            .is_none());
    }

    manager.registry().set_type_serializer(
        mystery_ty.type_id(),
        SerializerKind::Object,
        SerializerEntry::Object(Arc::new(GenericObjectSerializer)),
    );

    let _session = manager.open_session().unwrap();
    let entry = manager
        .serializer_for(&mystery_ty, SerializerKind::Object)
        .unwrap();
    assert!(matches!(entry, Some(SerializerEntry::Object(_))));
}

#[test]
fn type_level_root_serializer_takes_an_explicit_member_list() {
    let env = fixture_environment();
    let widget = instantiate(&env, "Widget");
    edit_widget(&widget, |w| w.label = "lone".to_owned());
    env.container.add(widget.clone(), Some("button1"), false).unwrap();

    let widget_ty = env.types.get("Widget").unwrap();
    let manager = SerializationManager::new(env);
    manager.registry().set_type_serializer(
        widget_ty.type_id(),
        SerializerKind::Root,
        SerializerEntry::Root(Arc::new(TypeLevelSerializer::with_members(vec![
            "label".to_owned()
        ]))),
    );

    let session = manager.open_session().unwrap();
    let decl = manager.serialize_root(&widget).unwrap();
    assert!(session.close().is_empty());

    assert!(decl.fields.is_empty());
    let statements = init_statements(&decl);
    assert_eq!(statements.len(), 1);
    assert!(matches!(
        &statements[0],
        Statement::Assign {
            left: Expression::PropertyRef { property, .. },
            right: Expression::Literal(Value::String(s)),
        } if property == "label" && s == "lone"
    ));
}

// ---------------------------------------------------------------------------
// Recycling
// ---------------------------------------------------------------------------

#[test]
fn recycled_instance_is_reused_unless_type_mismatches() {
    let env = fixture_environment();
    let widget = instantiate(&env, "Widget");
    env.container.add(widget.clone(), Some("w1"), false).unwrap();

    let manager = SerializationManager::new(env.clone());
    manager
        .set_options(SessionOptions {
            recycle_instances: true,
            validate_recycled_types: true,
            preserve_names: false,
        })
        .unwrap();
    let _session = manager.open_session().unwrap();

    let widget_ty = env.types.get("Widget").unwrap();
    let reused = manager
        .create_instance(&widget_ty, &[], Some("w1"), true)
        .unwrap();
    assert!(reused.same_instance(&widget));

    // A type change discards the cached instance and constructs fresh.
    let form_ty = env.types.get("Form").unwrap();
    let replaced = manager
        .create_instance(&form_ty, &[], Some("w1"), true)
        .unwrap();
    assert!(!replaced.same_instance(&widget));
    assert_eq!(replaced.type_name(), "Form");
}

// ---------------------------------------------------------------------------
// Forward references
// ---------------------------------------------------------------------------

#[test]
fn unknown_names_fall_through_to_the_resolve_callback() {
    let env = fixture_environment();
    let orphan = instantiate(&env, "Widget");
    let manager = SerializationManager::new(env);

    let fallback = orphan.clone();
    manager.set_resolve_name(move |name| {
        (name == "future").then(|| fallback.clone())
    });

    let _session = manager.open_session().unwrap();
    let found = manager.instance_by_name("future").unwrap().unwrap();
    assert!(found.same_instance(&orphan));
    assert!(manager.instance_by_name("nowhere").unwrap().is_none());
}
