//! Linear resampling into a preallocated output buffer.
//!
//! The transcription model consumes **22 050 Hz mono `f32`** audio; capture
//! runs at whatever rate the device reports.  [`resample_linear`] converts
//! between the two with plain linear interpolation — deterministic O(n) with
//! no filter state, which is accurate enough given the model's ~2 s context
//! window dominates any aliasing artifacts.
//!
//! The output buffer is caller-owned and reused tick after tick, so the hot
//! path never allocates.  Size it with [`output_len`].

// ---------------------------------------------------------------------------
// output_len
// ---------------------------------------------------------------------------

/// Number of output samples produced when resampling `input_len` samples
/// from `in_rate` to `out_rate` (ceiling of the exact ratio).
pub fn output_len(input_len: usize, in_rate: u32, out_rate: u32) -> usize {
    if in_rate == out_rate {
        return input_len;
    }
    (input_len as f64 * out_rate as f64 / in_rate as f64).ceil() as usize
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample `input` at `in_rate` Hz into `output`, interpreting `output` as
/// `out_rate` Hz.
///
/// For each output index `i`, the source position is
/// `pos = i * in_rate / out_rate`; the sample is linearly interpolated
/// between `input[floor(pos)]` and its successor, clamping at the final
/// input sample so boundary reads never run past the end.
///
/// * Equal rates with equal lengths are an exact copy (no interpolation).
/// * An empty `input` zero-fills `output`.
/// * `output` is always written in full.
pub fn resample_linear(input: &[f32], in_rate: u32, output: &mut [f32], out_rate: u32) {
    if input.is_empty() {
        output.fill(0.0);
        return;
    }

    if in_rate == out_rate && input.len() == output.len() {
        output.copy_from_slice(input);
        return;
    }

    let step = in_rate as f64 / out_rate as f64;
    let last = input.len() - 1;

    for (i, slot) in output.iter_mut().enumerate() {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;

        *slot = if idx >= last {
            input[last]
        } else {
            input[idx] + (input[idx + 1] - input[idx]) * frac
        };
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
