//! nimbus-script: the function language served by Nimbus.
//!
//! Source files are compiled once into an immutable [`Program`] and then
//! evaluated by a tree-walking [`Interpreter`] inside a sandbox scope built
//! by the host. The language is a small, JavaScript-flavoured subset:
//! `let`/`const`, `fn` and arrow functions, objects and arrays with value
//! semantics, `try`/`catch`, and `export` declarations at the top level.
//!
//! ```
//! use nimbus_script::{Interpreter, Limits, Scope, Value, compile, install_prelude};
//!
//! let program = compile("export default fn(ctx) { return 'hi ' + ctx.name }", "hello").unwrap();
//! let scope = Scope::root();
//! install_prelude(&scope);
//! let mut interp = Interpreter::new(Limits::default());
//! let exports = interp.run_module(&program, &scope).unwrap();
//! let main = exports.get("default").unwrap();
//! let ctx = Value::object([("name", Value::from("Ann"))]);
//! assert_eq!(interp.call(&main, vec![ctx]).unwrap(), Value::from("hi Ann"));
//! ```

pub mod ast;
mod builtins;
mod env;
mod error;
mod interp;
mod lexer;
mod parse_expr;
mod parser;
mod token;
mod value;

pub use ast::Program;
pub use builtins::{install_prelude, to_number};
pub use env::{Heap, Scope};
pub use error::{CompileError, ScriptError, ScriptResult};
pub use interp::{DEFAULT_MAX_CALL_DEPTH, Interpreter, Limits};
pub use lexer::Lexer;
pub use parser::Parser;
pub use value::{Closure, NativeFunction, Value, format_number};

/// Compile `source` into a program named `name`.
pub fn compile(source: &str, name: &str) -> Result<Program, CompileError> {
    let tokens = Lexer::new(source, name).tokenize()?;
    let program = Parser::new(tokens, name).parse_program()?;
    tracing::trace!(name, statements = program.body.len(), "compiled");
    Ok(program)
}
