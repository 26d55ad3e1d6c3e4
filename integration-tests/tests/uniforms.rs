//! Uniform value caching, shape checking and compile/link diagnostics.

use mugl::shader::{
  Arity, ProgramError, StageError, StageType, UniformKind, UniformShape, UniformValue,
};
use mugl_integ_tests::{context, program, FRAGMENT_SRC, VERTEX_SRC};
use mugl_mock::{Call, UniformPayload};

const VEC3: UniformShape = UniformShape::new(UniformKind::Float, Arity::Vec3);
const FLOAT: UniformShape = UniformShape::new(UniformKind::Float, Arity::Scalar);
const MAT2: UniformShape = UniformShape::new(UniformKind::Float, Arity::Mat2);
const BVEC2: UniformShape = UniformShape::new(UniformKind::Bool, Arity::Vec2);

fn uploads(mock: &mugl_mock::MockHandle) -> usize {
  mock.count(|c| matches!(c, Call::UploadUniform { .. }))
}

#[test]
fn equal_values_skip_the_upload() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("color", VEC3)], &[]);

  let first = [1.0f32, 2.0, 3.0];
  prog.set_uniform("color", UniformValue::Floats(&first)).unwrap();
  assert_eq!(uploads(&mock), 1);

  // a fresh container with equal contents is still equal
  let second = vec![1.0f32, 2.0, 3.0];
  prog.set_uniform("color", UniformValue::Floats(&second)).unwrap();
  assert_eq!(uploads(&mock), 1);

  prog
    .set_uniform("color", UniformValue::Floats(&[1.0, 2.0, 4.0]))
    .unwrap();
  assert_eq!(uploads(&mock), 2);
}

#[test]
fn scalar_values_cache_too() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("gain", FLOAT)], &[]);

  prog.set_uniform("gain", UniformValue::Float(0.5)).unwrap();
  prog.set_uniform("gain", UniformValue::Float(0.5)).unwrap();
  assert_eq!(uploads(&mock), 1);

  prog.set_uniform("gain", UniformValue::Float(0.25)).unwrap();
  assert_eq!(uploads(&mock), 2);
}

#[test]
fn unknown_uniform_fails_before_any_driver_call() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("color", VEC3)], &[]);

  mock.clear_calls();

  let err = prog
    .set_uniform("missing", UniformValue::Float(1.0))
    .unwrap_err();
  assert_eq!(err, ProgramError::UnknownUniform("missing".to_owned()));
  assert!(mock.calls().is_empty());
}

#[test]
fn arity_mismatch_is_rejected_and_leaves_the_cache_alone() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("color", VEC3)], &[]);

  prog
    .set_uniform("color", UniformValue::Floats(&[1.0, 2.0, 3.0]))
    .unwrap();
  assert_eq!(uploads(&mock), 1);

  // too few components
  let err = prog
    .set_uniform("color", UniformValue::Floats(&[1.0, 2.0]))
    .unwrap_err();
  assert_eq!(
    err,
    ProgramError::ShapeMismatch {
      name: "color".to_owned(),
      shape: VEC3,
    }
  );
  assert_eq!(uploads(&mock), 1);

  // wrong kind entirely
  let err = prog
    .set_uniform("color", UniformValue::Ints(&[1, 2, 3]))
    .unwrap_err();
  assert!(matches!(err, ProgramError::ShapeMismatch { .. }));

  // the cached value survived the failed writes
  prog
    .set_uniform("color", UniformValue::Floats(&[1.0, 2.0, 3.0]))
    .unwrap();
  assert_eq!(uploads(&mock), 1);
}

#[test]
fn matrix_transpose_flag_is_part_of_the_value() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("mvp", MAT2)], &[]);

  let m = [1.0f32, 0.0, 0.0, 1.0];

  // a bare float slice defaults to no transposition
  prog.set_uniform("mvp", UniformValue::Floats(&m)).unwrap();
  assert_eq!(uploads(&mock), 1);

  prog
    .set_uniform(
      "mvp",
      UniformValue::Matrices {
        data: &m,
        transpose: false,
      },
    )
    .unwrap();
  assert_eq!(uploads(&mock), 1);

  prog
    .set_uniform(
      "mvp",
      UniformValue::Matrices {
        data: &m,
        transpose: true,
      },
    )
    .unwrap();
  assert_eq!(uploads(&mock), 2);

  let transposed = mock.count(|c| {
    matches!(
      c,
      Call::UploadUniform {
        payload: UniformPayload::Matrices {
          transpose: true,
          ..
        },
        ..
      }
    )
  });
  assert_eq!(transposed, 1);
}

#[test]
fn booleans_go_down_as_integers() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("flags", BVEC2)], &[]);

  prog
    .set_uniform("flags", UniformValue::Bools(&[true, false]))
    .unwrap();

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::UploadUniform {
        payload: UniformPayload::Ints(v),
        ..
      } if v == &[1, 0]
    )),
    1
  );

  // same truth vector, no second upload
  prog
    .set_uniform("flags", UniformValue::Bools(&[true, false]))
    .unwrap();
  assert_eq!(uploads(&mock), 1);
}

#[test]
fn setting_a_uniform_makes_the_program_active_once() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("gain", FLOAT)], &[]);

  mock.clear_calls();

  prog.set_uniform("gain", UniformValue::Float(1.0)).unwrap();
  prog.set_uniform("gain", UniformValue::Float(2.0)).unwrap();

  assert_eq!(mock.count(|c| matches!(c, Call::UseProgram(Some(_)))), 1);
}

#[test]
fn compile_failure_carries_the_driver_log() {
  let (ctx, mock) = context();

  mock.fail_next_compile("0:1: syntax error");

  let err = mugl::shader::Program::from_sources(&ctx, VERTEX_SRC, FRAGMENT_SRC).unwrap_err();
  assert_eq!(
    err,
    ProgramError::Stage(StageError::CompilationFailed(
      StageType::Vertex,
      "0:1: syntax error".to_owned(),
    ))
  );
}

#[test]
fn link_failure_carries_the_driver_log() {
  let (ctx, mock) = context();

  mock.fail_next_link("varying mismatch");

  let err = mugl::shader::Program::from_sources(&ctx, VERTEX_SRC, FRAGMENT_SRC).unwrap_err();
  assert_eq!(err, ProgramError::LinkFailed("varying mismatch".to_owned()));
}
