//! Draw orchestration: element-count derivation and uniform plumbing.

use mugl::buffer::{Buffer, BufferTarget, ElemType, Usage};
use mugl::shader::{Arity, ProgramError, UniformKind, UniformShape, UniformValue};
use mugl::vertex_array::{AttributeFormat, DrawError, Primitive, VertexArray, VertexArrayError};
use mugl_integ_tests::{context, program};
use mugl_mock::Call;

const VEC3: UniformShape = UniformShape::new(UniformKind::Float, Arity::Vec3);

fn draw_calls(mock: &mugl_mock::MockHandle) -> usize {
  mock.count(Call::is_draw)
}

#[test]
fn vertex_count_derives_from_the_first_non_empty_attribute() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  // 12 floats, 3 components each: 4 vertices
  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 12], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();

  vao
    .draw(&mut prog, &[], Primitive::Triangles, 0, 1)
    .unwrap();

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::DrawArrays {
        primitive: Primitive::Triangles,
        first: 0,
        count: 4,
      }
    )),
    1
  );
}

#[test]
fn empty_attribute_buffers_are_passed_over() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position", "normal"]);

  let empty = Buffer::new(&ctx, BufferTarget::Array, &[] as &[f32], Usage::StaticDraw).unwrap();
  // 8 floats, 2 components each: 4 vertices
  let normals = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 8], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", empty, AttributeFormat::default())
    .unwrap();
  vao
    .attach(
      &mut prog,
      "normal",
      normals,
      AttributeFormat {
        components: 2,
        normalized: false,
      },
    )
    .unwrap();

  vao.draw(&mut prog, &[], Primitive::Lines, 0, 1).unwrap();

  assert_eq!(
    mock.count(|c| matches!(c, Call::DrawArrays { count: 4, .. })),
    1
  );
}

#[test]
fn index_buffers_drive_indexed_draws() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 9], Usage::StaticDraw).unwrap();
  let indices = Buffer::new(
    &ctx,
    BufferTarget::ElementArray,
    &[0u16, 1, 2, 2, 1, 0],
    Usage::StaticDraw,
  )
  .unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();
  vao.set_indices(indices).unwrap();

  vao
    .draw(&mut prog, &[], Primitive::Triangles, 0, 1)
    .unwrap();

  // 6 indices regardless of what the attribute buffers hold
  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::DrawElements {
        count: 6,
        elem: ElemType::U16,
        byte_offset: 0,
        ..
      }
    )),
    1
  );
}

#[test]
fn indexed_draw_offsets_are_scaled_to_bytes() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 9], Usage::StaticDraw).unwrap();
  let indices = Buffer::new(
    &ctx,
    BufferTarget::ElementArray,
    &[0u32, 1, 2, 2, 1, 0],
    Usage::StaticDraw,
  )
  .unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();
  vao.set_indices(indices).unwrap();

  vao
    .draw(&mut prog, &[], Primitive::Triangles, 3, 1)
    .unwrap();

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::DrawElements {
        elem: ElemType::U32,
        byte_offset: 12,
        ..
      }
    )),
    1
  );
}

#[test]
fn attribute_less_draw_is_a_silent_no_op() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &[]);

  let vao = VertexArray::new(&ctx, &prog).unwrap();

  vao
    .draw(&mut prog, &[], Primitive::Triangles, 0, 1)
    .unwrap();

  assert_eq!(draw_calls(&mock), 0);
}

#[test]
fn instanced_draws_forward_the_instance_count() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 6], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();

  vao
    .draw(&mut prog, &[], Primitive::Triangles, 0, 32)
    .unwrap();

  assert_eq!(
    mock.count(|c| matches!(
      c,
      Call::DrawArraysInstanced {
        count: 2,
        instances: 32,
        ..
      }
    )),
    1
  );
}

#[test]
fn draw_map_uniforms_are_applied_before_the_draw() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[("color", VEC3)], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();

  vao
    .draw(
      &mut prog,
      &[("color", UniformValue::Floats(&[1.0, 0.0, 0.0]))],
      Primitive::Triangles,
      0,
      1,
    )
    .unwrap();

  let calls = mock.calls();
  let upload_at = calls
    .iter()
    .position(|c| matches!(c, Call::UploadUniform { .. }))
    .expect("uniform uploaded");
  let draw_at = calls
    .iter()
    .position(Call::is_draw)
    .expect("draw issued");

  assert!(upload_at < draw_at);
}

#[test]
fn unknown_draw_map_entries_fail_before_the_draw() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();

  let err = vao
    .draw(
      &mut prog,
      &[("nope", UniformValue::Float(1.0))],
      Primitive::Triangles,
      0,
      1,
    )
    .unwrap_err();

  assert_eq!(
    err,
    DrawError::Uniform(ProgramError::UnknownUniform("nope".to_owned()))
  );
  assert_eq!(draw_calls(&mock), 0);
}

#[test]
fn drawing_with_a_foreign_program_is_rejected() {
  let (ctx, mock) = context();
  let mut owner = program(&ctx, &mock, &[], &["position"]);
  let mut other = program(&ctx, &mock, &[], &[]);

  let vao = VertexArray::new(&ctx, &owner).unwrap();

  mock.clear_calls();

  let err = vao
    .draw(&mut other, &[], Primitive::Triangles, 0, 1)
    .unwrap_err();

  assert_eq!(err, DrawError::ForeignProgram);
  assert!(mock.calls().is_empty());

  assert!(vao.draw(&mut owner, &[], Primitive::Triangles, 0, 1).is_ok());
}

#[test]
fn attachment_validates_before_touching_the_driver() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();
  let indices =
    Buffer::new(&ctx, BufferTarget::ElementArray, &[0u16, 1], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();

  mock.clear_calls();

  let err = vao
    .attach(
      &mut prog,
      "position",
      Buffer::new(&ctx, BufferTarget::Array, &[0.0f32], Usage::StaticDraw).unwrap(),
      AttributeFormat {
        components: 5,
        normalized: false,
      },
    )
    .unwrap_err();
  assert_eq!(err, VertexArrayError::InvalidComponents(5));

  let err = vao
    .attach(&mut prog, "missing", positions, AttributeFormat::default())
    .unwrap_err();
  assert_eq!(err, VertexArrayError::UnknownAttribute("missing".to_owned()));

  let err = vao.set_indices(
    Buffer::new(&ctx, BufferTarget::Array, &[0.0f32], Usage::StaticDraw).unwrap(),
  );
  assert_eq!(
    err.unwrap_err(),
    VertexArrayError::WrongTarget {
      expected: BufferTarget::ElementArray,
      got: BufferTarget::Array,
    }
  );

  let err = vao.attach(&mut prog, "position", indices, AttributeFormat::default());
  assert_eq!(
    err.unwrap_err(),
    VertexArrayError::WrongTarget {
      expected: BufferTarget::Array,
      got: BufferTarget::ElementArray,
    }
  );
}

#[test]
fn attributes_enable_once_per_vertex_array() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let a = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();
  let b = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();
  let c = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 3], Usage::StaticDraw).unwrap();

  let mut vao1 = VertexArray::new(&ctx, &prog).unwrap();
  let mut vao2 = VertexArray::new(&ctx, &prog).unwrap();

  vao1
    .attach(&mut prog, "position", a, AttributeFormat::default())
    .unwrap();
  // same attribute, same array: already enabled there
  vao1
    .attach(&mut prog, "position", b, AttributeFormat::default())
    .unwrap();
  assert_eq!(mock.count(|c| matches!(c, Call::EnableVertexAttrib(0))), 1);

  // a different array enables independently
  vao2
    .attach(&mut prog, "position", c, AttributeFormat::default())
    .unwrap();
  assert_eq!(mock.count(|c| matches!(c, Call::EnableVertexAttrib(0))), 2);
}

#[test]
fn detaching_disables_and_returns_the_buffer() {
  let (ctx, mock) = context();
  let mut prog = program(&ctx, &mock, &[], &["position"]);

  let positions = Buffer::new(&ctx, BufferTarget::Array, &[0.0f32; 6], Usage::StaticDraw).unwrap();

  let mut vao = VertexArray::new(&ctx, &prog).unwrap();
  vao
    .attach(&mut prog, "position", positions, AttributeFormat::default())
    .unwrap();

  let back = vao.detach(&mut prog, "position").unwrap();
  assert!(back.is_some());
  assert_eq!(back.unwrap().len(), 6);
  assert_eq!(mock.count(|c| matches!(c, Call::DisableVertexAttrib(0))), 1);

  // detaching again finds nothing and stays quiet
  assert!(vao.detach(&mut prog, "position").unwrap().is_none());
  assert_eq!(mock.count(|c| matches!(c, Call::DisableVertexAttrib(0))), 1);

  // with no bindings left, draws are no-ops again
  mock.clear_calls();
  vao.draw(&mut prog, &[], Primitive::Triangles, 0, 1).unwrap();
  assert_eq!(draw_calls(&mock), 0);
}
