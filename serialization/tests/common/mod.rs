//! Shared fixture types for the integration tests: a small designer
//! component set (a form, widgets, a tag collection, a flags enum)
//! registered through the metadata builders.

#![allow(dead_code)]

use std::sync::Arc;

use formloom_codemodel::Value;
use formloom_model::{
    new_cell, ConstructorInfo, DesignEnvironment, EventInfo, FlagsInfo, MethodInfo, ObjectHandle,
    PropertyInfo, PropertyValue, PropertyVisibility, TypeInfo, TypeRegistry,
};

pub const ANCHOR_NONE: u64 = 0;
pub const ANCHOR_TOP: u64 = 1;
pub const ANCHOR_LEFT: u64 = 2;
pub const ANCHOR_RIGHT: u64 = 4;
pub const ANCHOR_BOTTOM: u64 = 8;

/// Edge-anchoring flags for widgets.
pub struct Anchors(pub u64);

/// A leaf component with primitive, flag, and opaque properties plus one
/// event.
#[derive(Default)]
pub struct Widget {
    pub label: String,
    pub width: i64,
    pub visible: bool,
    pub anchors: u64,
    pub mystery: Option<ObjectHandle>,
}

/// A collection of tag strings, exposed as a content property.
#[derive(Default)]
pub struct TagList {
    pub items: Vec<String>,
}

/// A type with no serializer: exercises missing-serializer reporting.
pub struct Mystery;

/// The root component: caption, two widget references (identity dedup),
/// and an owned tag collection.
pub struct Form {
    pub caption: String,
    pub primary: Option<ObjectHandle>,
    pub secondary: Option<ObjectHandle>,
    pub tags: ObjectHandle,
}

fn expect_string(value: &PropertyValue) -> Result<String, String> {
    value
        .as_primitive()
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| format!("expected a string, got {}", value.type_name()))
}

fn expect_int(value: &PropertyValue) -> Result<i64, String> {
    value
        .as_primitive()
        .and_then(Value::as_bits)
        .map(|b| b as i64)
        .ok_or_else(|| format!("expected an integer, got {}", value.type_name()))
}

pub fn register_fixture_types(types: &TypeRegistry) {
    types.register(
        TypeInfo::builder::<Anchors>("Anchors")
            .flags(FlagsInfo::new(&[
                ("none", ANCHOR_NONE),
                ("top", ANCHOR_TOP),
                ("left", ANCHOR_LEFT),
                ("right", ANCHOR_RIGHT),
                ("bottom", ANCHOR_BOTTOM),
            ]))
            .build(),
    );

    types.register(
        TypeInfo::builder::<Mystery>("Mystery")
            .constructor(ConstructorInfo::nullary(|| Mystery))
            .build(),
    );

    types.register(
        TypeInfo::builder::<TagList>("TagList")
            .constructor(ConstructorInfo::nullary(TagList::default))
            .items(|t: &TagList| {
                t.items
                    .iter()
                    .map(|s| PropertyValue::Primitive(Value::String(s.clone())))
                    .collect()
            })
            .method(MethodInfo::single_arg::<TagList>("add", "string", |t, v| {
                t.items.push(expect_string(v)?);
                Ok(())
            }))
            .build(),
    );

    types.register(
        TypeInfo::builder::<Widget>("Widget")
            .component()
            .constructor(ConstructorInfo::nullary(Widget::default))
            .property(
                PropertyInfo::typed(
                    "label",
                    "string",
                    PropertyVisibility::Visible,
                    |w: &Widget| PropertyValue::Primitive(Value::String(w.label.clone())),
                )
                .with_setter(|w: &mut Widget, v| {
                    w.label = expect_string(&v)?;
                    Ok(())
                }),
            )
            .property(
                PropertyInfo::typed(
                    "width",
                    "i64",
                    PropertyVisibility::Visible,
                    |w: &Widget| PropertyValue::Primitive(Value::I64(w.width)),
                )
                .with_setter(|w: &mut Widget, v| {
                    w.width = expect_int(&v)?;
                    Ok(())
                })
                .serialize_when(|w: &Widget| w.width != 0),
            )
            .property(
                PropertyInfo::typed(
                    "visible",
                    "bool",
                    PropertyVisibility::Visible,
                    |w: &Widget| PropertyValue::Primitive(Value::Bool(w.visible)),
                )
                .with_setter(|w: &mut Widget, v| {
                    w.visible = matches!(v.as_primitive(), Some(Value::Bool(true)));
                    Ok(())
                }),
            )
            .property(
                PropertyInfo::typed(
                    "anchors",
                    "Anchors",
                    PropertyVisibility::Visible,
                    |w: &Widget| PropertyValue::Flags {
                        type_name: "Anchors".to_owned(),
                        bits: w.anchors,
                    },
                )
                .with_setter(|w: &mut Widget, v| {
                    w.anchors = v
                        .as_flag_bits()
                        .ok_or_else(|| "expected anchor flags".to_owned())?;
                    Ok(())
                })
                .serialize_when(|w: &Widget| w.anchors != 0),
            )
            .property(
                PropertyInfo::typed(
                    "mystery",
                    "Mystery",
                    PropertyVisibility::Visible,
                    |w: &Widget| match &w.mystery {
                        Some(h) => PropertyValue::Object(h.clone()),
                        None => PropertyValue::Missing,
                    },
                )
                .serialize_when(|w: &Widget| w.mystery.is_some()),
            )
            .event(EventInfo::new("clicked", "ClickHandler"))
            .build(),
    );

    let tag_list_info = types
        .get("TagList")
        .expect("TagList registered just above");
    types.register(
        TypeInfo::builder::<Form>("Form")
            .component()
            .constructor(ConstructorInfo::new(&[], move |_| {
                Ok(new_cell(Form {
                    caption: String::new(),
                    primary: None,
                    secondary: None,
                    tags: ObjectHandle::new(tag_list_info.clone(), TagList::default()),
                }))
            }))
            .property(
                PropertyInfo::typed(
                    "caption",
                    "string",
                    PropertyVisibility::Visible,
                    |f: &Form| PropertyValue::Primitive(Value::String(f.caption.clone())),
                )
                .with_setter(|f: &mut Form, v| {
                    f.caption = expect_string(&v)?;
                    Ok(())
                })
                .serialize_when(|f: &Form| !f.caption.is_empty()),
            )
            .property(
                PropertyInfo::typed(
                    "primary",
                    "Widget",
                    PropertyVisibility::Visible,
                    |f: &Form| match &f.primary {
                        Some(h) => PropertyValue::Object(h.clone()),
                        None => PropertyValue::Missing,
                    },
                )
                .with_setter(|f: &mut Form, v| {
                    f.primary = v.as_object().cloned();
                    Ok(())
                })
                .serialize_when(|f: &Form| f.primary.is_some()),
            )
            .property(
                PropertyInfo::typed(
                    "secondary",
                    "Widget",
                    PropertyVisibility::Visible,
                    |f: &Form| match &f.secondary {
                        Some(h) => PropertyValue::Object(h.clone()),
                        None => PropertyValue::Missing,
                    },
                )
                .with_setter(|f: &mut Form, v| {
                    f.secondary = v.as_object().cloned();
                    Ok(())
                })
                .serialize_when(|f: &Form| f.secondary.is_some()),
            )
            .property(PropertyInfo::typed(
                "tags",
                "TagList",
                PropertyVisibility::Content,
                |f: &Form| PropertyValue::Object(f.tags.clone()),
            ))
            .build(),
    );
}

/// A fresh environment with the fixture types registered.
pub fn fixture_environment() -> DesignEnvironment {
    let types = Arc::new(TypeRegistry::new());
    let env = DesignEnvironment::new(types);
    register_fixture_types(&env.types);
    env
}

/// Construct an instance of a registered type through its nullary
/// constructor.
pub fn instantiate(env: &DesignEnvironment, type_name: &str) -> ObjectHandle {
    let ty = env
        .types
        .get(type_name)
        .unwrap_or_else(|| panic!("type '{type_name}' not registered"));
    let cell = ty
        .find_constructor(&[])
        .unwrap_or_else(|| panic!("type '{type_name}' has no nullary constructor"))
        .construct(&[])
        .unwrap();
    ObjectHandle::from_cell(ty, cell)
}

/// Mutate a widget instance in place.
pub fn edit_widget(handle: &ObjectHandle, f: impl FnOnce(&mut Widget)) {
    handle.downcast_with_mut(f).expect("not a Widget");
}

/// Mutate a form instance in place.
pub fn edit_form(handle: &ObjectHandle, f: impl FnOnce(&mut Form)) {
    handle.downcast_with_mut(f).expect("not a Form");
}

/// Read a widget field for assertions.
pub fn widget_state(handle: &ObjectHandle) -> (String, i64, bool, u64) {
    handle
        .downcast_with(|w: &Widget| (w.label.clone(), w.width, w.visible, w.anchors))
        .expect("not a Widget")
}

pub fn tag_items(handle: &ObjectHandle) -> Vec<String> {
    handle
        .downcast_with(|f: &Form| {
            f.tags
                .downcast_with(|t: &TagList| t.items.clone())
                .expect("not a TagList")
        })
        .expect("not a Form")
}
