//! Hand-assembled SPIR-V used when no runtime shader compiler is available.

use super::MAGIC;

const VERSION_1_0: u32 = 0x0001_0000;

/// Passes `inPosition` (location 0, vec2) through as clip position and
/// forwards `inColor` (location 1, vec3).
#[rustfmt::skip]
pub static TRIANGLE_VERT: &[u32] = &[
    MAGIC, VERSION_1_0, 0, 24, 0,
    0x00020011, 1,
    0x0003000E, 0, 1,
    0x0009000F, 0, 1, 0x6E69616D, 0, 12, 13, 14, 15,
    0x00040047, 12, 30, 0,
    0x00040047, 13, 30, 1,
    0x00040047, 14, 30, 0,
    0x00040047, 15, 11, 0,
    0x00020013, 2,
    0x00030021, 3, 2,
    0x00030016, 4, 32,
    0x00040017, 5, 4, 2,
    0x00040017, 6, 4, 3,
    0x00040017, 7, 4, 4,
    0x00040020, 8, 1, 5,
    0x00040020, 9, 1, 6,
    0x00040020, 10, 3, 6,
    0x00040020, 11, 3, 7,
    0x0004003B, 8, 12, 1,
    0x0004003B, 9, 13, 1,
    0x0004003B, 10, 14, 3,
    0x0004003B, 11, 15, 3,
    0x0004002B, 4, 16, 0,
    0x0004002B, 4, 17, 0x3F800000,
    0x00050036, 2, 1, 0, 3,
    0x000200F8, 18,
    0x0004003D, 5, 19, 12,
    0x00050051, 4, 20, 19, 0,
    0x00050051, 4, 21, 19, 1,
    0x00070050, 7, 22, 20, 21, 16, 17,
    0x0003003E, 15, 22,
    0x0004003D, 6, 23, 13,
    0x0003003E, 14, 23,
    0x000100FD,
    0x00010038,
];

/// Writes the interpolated vertex colour with alpha 1.
#[rustfmt::skip]
pub static TRIANGLE_FRAG: &[u32] = &[
    MAGIC, VERSION_1_0, 0, 15, 0,
    0x00020011, 1,
    0x0003000E, 0, 1,
    0x0007000F, 4, 1, 0x6E69616D, 0, 9, 10,
    0x00030010, 1, 7,
    0x00040047, 9, 30, 0,
    0x00040047, 10, 30, 0,
    0x00020013, 2,
    0x00030021, 3, 2,
    0x00030016, 4, 32,
    0x00040017, 5, 4, 3,
    0x00040017, 6, 4, 4,
    0x00040020, 7, 1, 5,
    0x00040020, 8, 3, 6,
    0x0004003B, 7, 9, 1,
    0x0004003B, 8, 10, 3,
    0x0004002B, 4, 11, 0x3F800000,
    0x00050036, 2, 1, 0, 3,
    0x000200F8, 12,
    0x0004003D, 5, 13, 9,
    0x00050050, 6, 14, 13, 11,
    0x0003003E, 10, 14,
    0x000100FD,
    0x00010038,
];

/// Emits a full-screen triangle from `gl_VertexIndex`; draw with three
/// vertices and no vertex input.
#[rustfmt::skip]
pub static FULLSCREEN_VERT: &[u32] = &[
    MAGIC, VERSION_1_0, 0, 31, 0,
    0x00020011, 1,
    0x0003000E, 0, 1,
    0x0007000F, 0, 1, 0x6E69616D, 0, 10, 11,
    0x00040047, 10, 11, 42,
    0x00040047, 11, 11, 0,
    0x00020013, 2,
    0x00030021, 3, 2,
    0x00040015, 4, 32, 1,
    0x00030016, 5, 32,
    0x00040017, 6, 5, 2,
    0x00040017, 7, 5, 4,
    0x00040020, 8, 1, 4,
    0x00040020, 9, 3, 7,
    0x0004003B, 8, 10, 1,
    0x0004003B, 9, 11, 3,
    0x0004002B, 4, 12, 1,
    0x0004002B, 4, 13, 2,
    0x0004002B, 5, 14, 0,
    0x0004002B, 5, 15, 0x3F800000,
    0x0004002B, 5, 16, 0x40000000,
    0x00050036, 2, 1, 0, 3,
    0x000200F8, 17,
    0x0004003D, 4, 18, 10,
    0x000500C4, 4, 19, 18, 12,
    0x000500C7, 4, 20, 19, 13,
    0x000500C7, 4, 21, 18, 13,
    0x0004006F, 5, 22, 20,
    0x0004006F, 5, 23, 21,
    0x00050050, 6, 24, 22, 23,
    0x0005008E, 6, 25, 24, 16,
    0x00050051, 5, 26, 25, 0,
    0x00050051, 5, 27, 25, 1,
    0x00050083, 5, 28, 26, 15,
    0x00050083, 5, 29, 27, 15,
    0x00070050, 7, 30, 28, 29, 14, 15,
    0x0003003E, 11, 30,
    0x000100FD,
    0x00010038,
];

/// Resolution-normalised gradient pulsing with `iTime`, gamma-encoded in
/// the shader for UNORM swapchains. Reads the 16-byte push-constant block.
#[rustfmt::skip]
pub static GRADIENT_FRAG: &[u32] = &[
    MAGIC, VERSION_1_0, 0, 41, 0,
    0x00020011, 1,
    0x0006000B, 4, 0x4C534C47, 0x6474732E, 0x3035342E, 0,
    0x0003000E, 0, 1,
    0x0007000F, 4, 1, 0x6E69616D, 0, 13, 15,
    0x00030010, 1, 7,
    0x00030047, 9, 2,
    0x00050048, 9, 0, 35, 0,
    0x00050048, 9, 1, 35, 4,
    0x00050048, 9, 2, 35, 8,
    0x00040047, 13, 11, 15,
    0x00040047, 15, 30, 0,
    0x00020013, 2,
    0x00030021, 3, 2,
    0x00030016, 5, 32,
    0x00040017, 6, 5, 2,
    0x00040017, 7, 5, 3,
    0x00040017, 8, 5, 4,
    0x0005001E, 9, 5, 5, 6,
    0x00040020, 10, 9, 9,
    0x0004003B, 10, 11, 9,
    0x00040020, 12, 1, 8,
    0x0004003B, 12, 13, 1,
    0x00040020, 14, 3, 8,
    0x0004003B, 14, 15, 3,
    0x00040015, 16, 32, 1,
    0x0004002B, 16, 17, 0,
    0x0004002B, 16, 18, 2,
    0x00040020, 19, 9, 5,
    0x00040020, 20, 9, 6,
    0x0004002B, 5, 21, 0x3F000000,
    0x0004002B, 5, 22, 0x3F800000,
    0x0004002B, 5, 23, 0x3EE8BA2F,
    0x0006002C, 7, 24, 23, 23, 23,
    0x00050036, 2, 1, 0, 3,
    0x000200F8, 25,
    0x0004003D, 8, 26, 13,
    0x0007004F, 6, 27, 26, 26, 0, 1,
    0x00050041, 20, 28, 11, 18,
    0x0004003D, 6, 29, 28,
    0x00050088, 6, 30, 27, 29,
    0x00050041, 19, 31, 11, 17,
    0x0004003D, 5, 32, 31,
    0x0006000C, 5, 33, 4, 13, 32,
    0x00050085, 5, 34, 33, 21,
    0x00050081, 5, 35, 34, 21,
    0x00050051, 5, 36, 30, 0,
    0x00050051, 5, 37, 30, 1,
    0x00060050, 7, 38, 36, 37, 35,
    0x0007000C, 7, 39, 4, 26, 38, 24,
    0x00050050, 8, 40, 39, 22,
    0x0003003E, 15, 40,
    0x000100FD,
    0x00010038,
];
