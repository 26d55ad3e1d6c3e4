//! Shared fixtures for the protocol tests.

use mugl::shader::{Program, UniformShape};
use mugl::Context;
use mugl_mock::{Interface, MockDriver, MockHandle};

/// Placeholder sources; the mock driver compiles anything.
pub const VERTEX_SRC: &str = "void main() { gl_Position = vec4(0.); }";
pub const FRAGMENT_SRC: &str = "void main() {}";

/// A fresh context over a recording driver, plus the inspection handle.
pub fn context() -> (Context<MockDriver>, MockHandle) {
  let _ = env_logger::builder().is_test(true).try_init();

  let driver = MockDriver::new();
  let mock = driver.handle();

  (Context::new(driver), mock)
}

/// Link a program whose introspected interface reports the given uniforms
/// and attributes.
pub fn program(
  ctx: &Context<MockDriver>,
  mock: &MockHandle,
  uniforms: &[(&str, UniformShape)],
  attributes: &[&str],
) -> Program<MockDriver> {
  mock.expect_program(Interface::new(uniforms, attributes));
  Program::from_sources(ctx, VERTEX_SRC, FRAGMENT_SRC).expect("link fixture program")
}
