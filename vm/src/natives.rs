//! Host-provided functions bound into every VM's global scope at
//! startup, wired into `Vm::new`'s globals map.

use compiler::value::{Interner, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// `clock()` — seconds since the Unix epoch, as a float. Lets test
/// programs measure wall-clock elapsed time without the VM needing a
/// host clock abstraction of its own.
pub fn clock(args: &[Value], _interner: &mut Interner) -> Result<Value, String> {
    if !args.is_empty() {
        return Err(format!("Expected 0 arguments but got {}.", args.len()));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| e.to_string())?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// `type_of(value)` — the same string [`Value::type_name`] reports,
/// exposed to scripts. Useful for tests that want to assert on a
/// value's runtime type without pattern-matching the host representation.
pub fn type_of(args: &[Value], interner: &mut Interner) -> Result<Value, String> {
    match args {
        [value] => Ok(Value::from(interner.intern(value.type_name()))),
        _ => Err(format!("Expected 1 argument but got {}.", args.len())),
    }
}
