//! Binding of field and method references to their declaring classes and dispatch slots.

use crate::{
    hierarchy::pool::ClassPool,
    ir::{
        AccessFlags, ClassDescriptor, Dispatch, FieldRef, HierarchyState, InstructionKind, MethodRef,
        MethodSignature, Opcode, OBJECT_CLASS,
    },
};

enum Binding {
    Field(String),
    Method(Dispatch),
}

/// Finds the class declaring field `name`, searching `owner`, its interfaces and superclasses.
#[must_use]
pub fn field_owner(pool: &ClassPool, owner: &str, name: &str) -> Option<String> {
    for class in pool.super_chain(owner) {
        if class.find_field(name).is_some() {
            return Some(class.name.clone());
        }
        for interface in pool.all_interfaces(&class.name) {
            if pool
                .get(&interface)
                .is_some_and(|candidate| candidate.find_field(name).is_some())
            {
                return Some(interface);
            }
        }
    }
    None
}

/// Finds the class whose body a direct call of `signature` through `owner` executes.
#[must_use]
pub fn method_owner(pool: &ClassPool, owner: &str, signature: &MethodSignature) -> Option<String> {
    let declares = |class: &ClassDescriptor| {
        class
            .find_method(signature)
            .is_some_and(|method| !method.is_abstract())
    };
    if let Some(class) = pool.super_chain(owner).find(|class| declares(class)) {
        return Some(class.name.clone());
    }
    pool.all_interfaces(owner)
        .into_iter()
        .find(|interface| pool.get(interface).is_some_and(declares))
}

fn bind_field(pool: &ClassPool, field: &FieldRef) -> Option<Binding> {
    match field_owner(pool, &field.owner, &field.name) {
        Some(declaring) => Some(Binding::Field(declaring)),
        None => {
            log::debug!("unbound field {}.{}", field.owner, field.name);
            None
        }
    }
}

fn virtual_slot(pool: &ClassPool, owner: &str, signature: &MethodSignature) -> Option<Dispatch> {
    let class = pool.resolved(owner)?;
    let slot = class.vtable_slot(signature)?;
    Some(Dispatch::Virtual {
        owner: owner.to_string(),
        slot,
    })
}

fn bind_method(pool: &ClassPool, opcode: Opcode, method: &MethodRef) -> Option<Binding> {
    let direct = || Dispatch::Direct {
        owner: method_owner(pool, &method.owner, &method.signature)
            .unwrap_or_else(|| method.owner.clone()),
    };

    let dispatch = match opcode {
        Opcode::Invokestatic | Opcode::Invokespecial => direct(),
        Opcode::Invokevirtual => {
            let target = pool
                .get(&method.owner)
                .and_then(|class| class.find_method(&method.signature));
            // Private methods never take part in overriding.
            if target.is_some_and(|method| method.access.contains(AccessFlags::PRIVATE)) {
                direct()
            } else {
                match virtual_slot(pool, &method.owner, &method.signature) {
                    Some(dispatch) => dispatch,
                    None => {
                        log::warn!(
                            "no vtable slot for {}.{}, calling directly",
                            method.owner,
                            method.signature
                        );
                        direct()
                    }
                }
            }
        }
        Opcode::Invokeinterface => {
            let index = pool.resolved(&method.owner).and_then(|interface| {
                interface
                    .interface_methods
                    .iter()
                    .position(|signature| *signature == method.signature)
            });
            match index {
                Some(index) => Dispatch::Interface {
                    owner: method.owner.clone(),
                    index,
                },
                None => match virtual_slot(pool, &method.owner, &method.signature)
                    .filter(|_| {
                        super::resolver::OBJECT_METHODS.iter().any(|(name, descriptor)| {
                            *name == method.signature.name()
                                && *descriptor == method.signature.descriptor()
                        })
                    }) {
                    Some(Dispatch::Virtual { slot, .. }) => Dispatch::Virtual {
                        owner: OBJECT_CLASS.to_string(),
                        slot,
                    },
                    _ => {
                        log::warn!(
                            "no interface method {}.{}, calling directly",
                            method.owner,
                            method.signature
                        );
                        direct()
                    }
                },
            }
        }
        _ => return None,
    };
    Some(Binding::Method(dispatch))
}

/// Binds every field and method reference in resolved classes.
///
/// Field references get the class actually declaring the field. Calls get a [`Dispatch`]:
/// static and special calls bind to the class providing the body, virtual calls to a vtable
/// slot, interface calls to the interface method index. References into classes that are
/// missing or excluded stay unbound or fall back to a direct call. Returns the number of
/// bound references.
pub fn bind_symbols(pool: &mut ClassPool) -> usize {
    let ids: Vec<_> = pool.ids().collect();
    let mut bound = 0;
    for id in ids {
        let class = pool.class(id);
        if class.state != HierarchyState::Resolved {
            continue;
        }

        let mut bindings = Vec::new();
        for (method_index, method) in class.methods.iter().enumerate() {
            for (index, instruction) in method.instructions.iter().enumerate() {
                let binding = match &instruction.kind {
                    InstructionKind::Field { field, .. } => bind_field(pool, field),
                    InstructionKind::Invoke { opcode, method } => bind_method(pool, *opcode, method),
                    _ => None,
                };
                if let Some(binding) = binding {
                    bindings.push((method_index, index, binding));
                }
            }
        }

        bound += bindings.len();
        let class = pool.class_mut(id);
        for (method_index, index, binding) in bindings {
            match (&mut class.methods[method_index].instructions[index].kind, binding) {
                (InstructionKind::Field { field, .. }, Binding::Field(declaring)) => {
                    field.declaring = Some(declaring);
                }
                (InstructionKind::Invoke { method, .. }, Binding::Method(dispatch)) => {
                    method.dispatch = Some(dispatch);
                }
                _ => {}
            }
        }
    }
    log::debug!("bound {} symbol references", bound);
    bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hierarchy::resolver::resolve_all,
        ir::{FieldDescriptor, Instruction, JavaType, MethodDescriptor},
    };

    fn method(owner: &str, name: &str, descriptor: &str) -> MethodDescriptor {
        MethodDescriptor::new(
            owner,
            MethodSignature::new(name, descriptor).unwrap(),
            AccessFlags::PUBLIC,
        )
    }

    fn invoke(opcode: Opcode, owner: &str, name: &str, descriptor: &str) -> Instruction {
        Instruction::new(InstructionKind::Invoke {
            opcode,
            method: MethodRef {
                owner: owner.into(),
                signature: MethodSignature::new(name, descriptor).unwrap(),
                interface: opcode == Opcode::Invokeinterface,
                dispatch: None,
            },
        })
    }

    #[test]
    fn test_binds_calls_and_fields() {
        let mut pool = ClassPool::new();
        let mut a = ClassDescriptor::new("pkg/A", Some(OBJECT_CLASS), AccessFlags::PUBLIC);
        a.fields.push(FieldDescriptor {
            name: "count".into(),
            ty: JavaType::int(),
            access: AccessFlags::PUBLIC,
            constant: None,
            annotations: Vec::new(),
            weak: false,
        });
        a.methods.push(method("pkg/A", "run", "()V"));

        let mut b = ClassDescriptor::new("pkg/B", Some("pkg/A"), AccessFlags::PUBLIC);
        let mut caller = method("pkg/B", "call", "()V");
        caller.instructions = vec![
            invoke(Opcode::Invokevirtual, "pkg/B", "run", "()V"),
            invoke(Opcode::Invokespecial, "pkg/B", "run", "()V"),
            invoke(Opcode::Invokevirtual, "pkg/B", "toString", "()Ljava/lang/String;"),
            Instruction::new(InstructionKind::Field {
                opcode: Opcode::Getfield,
                field: FieldRef {
                    owner: "pkg/B".into(),
                    name: "count".into(),
                    ty: JavaType::int(),
                    declaring: None,
                },
            }),
        ];
        b.methods.push(caller);
        pool.insert(a);
        pool.insert(b);
        resolve_all(&mut pool);
        assert_eq!(bind_symbols(&mut pool), 4);

        let call = &pool.get("pkg/B").unwrap().methods[0];
        let dispatch = |index: usize| match &call.instructions[index].kind {
            InstructionKind::Invoke { method, .. } => method.dispatch.clone(),
            _ => None,
        };
        assert_eq!(
            dispatch(0),
            Some(Dispatch::Virtual {
                owner: "pkg/B".into(),
                slot: 11
            })
        );
        assert_eq!(
            dispatch(1),
            Some(Dispatch::Direct {
                owner: "pkg/A".into()
            })
        );
        assert_eq!(
            dispatch(2),
            Some(Dispatch::Virtual {
                owner: "pkg/B".into(),
                slot: 4
            })
        );
        match &call.instructions[3].kind {
            InstructionKind::Field { field, .. } => {
                assert_eq!(field.declaring.as_deref(), Some("pkg/A"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
