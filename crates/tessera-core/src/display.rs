use std::fmt;

use crate::array::Array;
use crate::backend::Backend;
use crate::dtype::HostValue;
use crate::error::Result;
use crate::expr::ExpressionTree;

// Rendering — bounded text form of an array
//
// The array is copied to the host and printed as nested brackets. For a
// matrix each row is one line; higher axes wrap around the matrix, the last
// axis outermost. Any axis longer than 2·WINDOW shows its first and last
// WINDOW entries around an ellipsis:
//
//   [[0,10,20,...,70,80,90],
//   [1,11,21,...,71,81,91]]

/// Entries shown at each end of a truncated axis.
pub const WINDOW: usize = 3;

/// Positions of an axis to print; `None` marks the ellipsis.
fn visible(len: usize) -> Vec<Option<usize>> {
    if len > 2 * WINDOW {
        (0..WINDOW)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((len - WINDOW..len).map(Some))
            .collect()
    } else {
        (0..len).map(Some).collect()
    }
}

struct Renderer<'a> {
    values: &'a [HostValue],
    dims: &'a [usize],
    strides: Vec<usize>,
    /// Axis printed at each nesting depth, outermost first.
    order: Vec<usize>,
}

impl Renderer<'_> {
    fn level(&self, depth: usize, index: &mut [usize], out: &mut String) {
        let axis = self.order[depth];
        let innermost = depth + 1 == self.order.len();
        out.push('[');
        for (n, pos) in visible(self.dims[axis]).into_iter().enumerate() {
            if n > 0 {
                out.push_str(if innermost { "," } else { ",\n" });
            }
            match pos {
                None => out.push_str("..."),
                Some(p) => {
                    index[axis] = p;
                    if innermost {
                        let flat: usize = index.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
                        out.push_str(&self.values[flat].to_string());
                    } else {
                        self.level(depth + 1, index, out);
                    }
                }
            }
        }
        out.push(']');
    }
}

/// Render an array as bracketed text.
pub fn render<B: Backend>(array: &Array<B>) -> Result<String> {
    let values = array.to_host_values()?;
    let dims = array.dims();
    if dims.is_empty() {
        return Ok(format!("[{}]", values[0]));
    }
    let rank = dims.len();
    let order: Vec<usize> = if rank == 1 {
        vec![0]
    } else {
        (2..rank).rev().chain([0, 1]).collect()
    };
    let renderer = Renderer {
        values: &values,
        dims,
        strides: array.shape().stride_contiguous(),
        order,
    };
    let mut out = String::new();
    renderer.level(0, &mut vec![0; rank], &mut out);
    Ok(out)
}

impl<B: Backend> fmt::Display for Array<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = render(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// Displaying a tree evaluates it into a temporary array first.
impl<B: Backend> fmt::Display for ExpressionTree<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let array = Array::from_tree(self).map_err(|_| fmt::Error)?;
        fmt::Display::fmt(&array, f)
    }
}
