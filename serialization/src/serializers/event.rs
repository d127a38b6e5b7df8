//! Event members: an attach statement per bound handler.

use formloom_codemodel::{Expression, Statement};
use formloom_model::ObjectHandle;

use crate::manager::SerializationManager;
use crate::registry::{Member, MemberSerializer};

pub struct EventSerializer;

impl MemberSerializer for EventSerializer {
    fn should_serialize(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        _absolute: bool,
    ) -> bool {
        let Member::Event(event) = member else {
            return false;
        };
        manager
            .environment()
            .events
            .handler_of(owner.id(), event.name())
            .is_some()
    }

    fn serialize_member(
        &self,
        manager: &SerializationManager,
        owner: &ObjectHandle,
        member: &Member<'_>,
        _absolute: bool,
    ) {
        let Member::Event(event) = member else {
            return;
        };
        let Some(handler) = manager
            .environment()
            .events
            .handler_of(owner.id(), event.name())
        else {
            // Nothing bound, nothing serialized.
            return;
        };
        let Some(target) = manager
            .cached_expression(owner.id())
            .or_else(|| manager.expression_context().map(|c| c.expression))
        else {
            log::debug!("no expression in scope for event '{}'", event.name());
            return;
        };

        let attach = Statement::AttachEvent {
            target,
            event: event.name().to_owned(),
            listener: Expression::Delegate {
                target: Box::new(Expression::SelfRef),
                method: handler,
            },
        };
        if !manager.append_statement(attach) {
            log::debug!("event '{}' had no statement context", event.name());
        }
    }
}
