//! Constants installed at startup.

use tern_diagnostic::{DiagnosticQueue, ErrorLevel};
use tern_value::Value;

use crate::{ConstError, Constant, ConstantTable};

/// Install `TRUE`, `FALSE`, `NULL`, the `E_*` levels and `ZEND_THREAD_SAFE`
/// as persistent constants.
///
/// Must run while `table` still owns its persistent half exclusively.
pub fn register_builtins(
    table: &mut ConstantTable,
    diagnostics: &mut DiagnosticQueue,
) -> Result<(), ConstError> {
    let literals = [
        ("TRUE", Value::Bool(true)),
        ("FALSE", Value::Bool(false)),
        ("NULL", Value::Null),
    ];
    for (name, value) in literals {
        table.register(
            Constant::new(name, value).persistent().case_insensitive(),
            diagnostics,
        )?;
    }

    for (name, level) in ErrorLevel::NAMED {
        table.register(
            Constant::new(name, Value::Int(i64::from(level.bits()))).persistent(),
            diagnostics,
        )?;
    }

    // Workers run on separate threads sharing the persistent half.
    table.register(
        Constant::new("ZEND_THREAD_SAFE", Value::Bool(true)).persistent(),
        diagnostics,
    )?;
    Ok(())
}
