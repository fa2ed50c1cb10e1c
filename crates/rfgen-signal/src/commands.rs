//! Command table flattening
//!
//! A command table is either flat (`command -> payload`) or typed
//! (`type -> command -> payload`). Either form may carry per-command
//! subtype variants (`command -> subtype -> payload`). Flattening produces
//! one namespace:
//!
//! - `default` type, `default` subtype: `cmd`
//! - `default` type, other subtype:     `cmd~$subtype`
//! - other type, `default` subtype:     `type$~cmd`
//! - other type, other subtype:         `type$~cmd~$subtype`

use serde_json::{Map, Value};

use crate::error::{type_name, SignalError};

/// Separator between a command type and the command name
pub const TYPE_SEPARATOR: &str = "$~";

/// Separator between a command name and its subtype
pub const SUBTYPE_SEPARATOR: &str = "~$";

/// Name of the implicit type and subtype
pub const DEFAULT_KEY: &str = "default";

/// Flattened command table (insertion ordered)
pub type CommandTable = Map<String, Value>;

/// Transformation applied to every leaf payload before storage
pub trait CommandTransform {
    fn apply(&self, payload: &Value) -> Value;
}

impl<F> CommandTransform for F
where
    F: Fn(&Value) -> Value,
{
    fn apply(&self, payload: &Value) -> Value {
        self(payload)
    }
}

/// Flatten a command table.
///
/// The table is typed when every top-level value is itself a mapping.
/// `null` payloads are skipped. Names containing a reserved separator, or
/// two commands mangling to the same key, fail the whole table.
pub fn normalize_commands(
    cmds: &Value,
    transform: Option<&dyn CommandTransform>,
) -> Result<CommandTable, SignalError> {
    let Value::Object(cmds) = cmds else {
        return Err(SignalError::InvalidCommandTable(type_name(cmds)));
    };

    let typed = !cmds.is_empty() && cmds.values().all(Value::is_object);
    let mut table = CommandTable::new();

    if typed {
        for (kind, list) in cmds {
            check_name(kind)?;
            let Value::Object(list) = list else {
                continue;
            };
            for (cmd, payload) in flatten_subtypes(list, transform)? {
                let key = if kind == DEFAULT_KEY {
                    cmd
                } else {
                    format!("{}{}{}", kind, TYPE_SEPARATOR, cmd)
                };
                insert_unique(&mut table, key, payload)?;
            }
        }
    } else {
        for (cmd, payload) in flatten_subtypes(cmds, transform)? {
            insert_unique(&mut table, cmd, payload)?;
        }
    }

    Ok(table)
}

fn flatten_subtypes(
    list: &Map<String, Value>,
    transform: Option<&dyn CommandTransform>,
) -> Result<Vec<(String, Value)>, SignalError> {
    let apply = |payload: &Value| match transform {
        Some(t) => t.apply(payload),
        None => payload.clone(),
    };

    let mut out = Vec::with_capacity(list.len());
    for (cmd, payload) in list {
        check_name(cmd)?;
        match payload {
            Value::Null => {}
            Value::Object(subtypes) => {
                for (subtype, sub_payload) in subtypes {
                    check_name(subtype)?;
                    if sub_payload.is_null() {
                        continue;
                    }
                    let key = if subtype == DEFAULT_KEY {
                        cmd.clone()
                    } else {
                        format!("{}{}{}", cmd, SUBTYPE_SEPARATOR, subtype)
                    };
                    out.push((key, apply(sub_payload)));
                }
            }
            other => out.push((cmd.clone(), apply(other))),
        }
    }
    Ok(out)
}

fn check_name(name: &str) -> Result<(), SignalError> {
    for separator in [TYPE_SEPARATOR, SUBTYPE_SEPARATOR] {
        if name.contains(separator) {
            return Err(SignalError::ReservedSeparator {
                name: name.to_string(),
                separator,
            });
        }
    }
    Ok(())
}

// Separator-free names can still meet at a boundary (type `b~` with command
// `c`, command `b` with subtype `~c`), so every key is checked on insert.
fn insert_unique(table: &mut CommandTable, key: String, payload: Value) -> Result<(), SignalError> {
    if table.contains_key(&key) {
        return Err(SignalError::CommandCollision { key });
    }
    table.insert(key, payload);
    Ok(())
}
