use std::fmt::Display;
use std::io::Write;

use anyhow::Result;

use crate::error::AlignError;

/// A dense dynamic programming matrix indexed by (query column, template column).
///
/// Rows run over query columns 0..=query_length + 1 and columns over template
/// columns 0..=template_length + 1, so row/column 0 act as the boundary and
/// the extra trailing row/column can be read as "past the end".
#[derive(Clone, Debug)]
pub struct DpMatrix<T> {
    pub query_length: usize,
    pub template_length: usize,
    /// The cells as a flat, row-major vector:
    ///
    /// ```text
    /// [ c_(0, 0), c_(0, 1), ... c_(0, T + 1),
    ///   ...
    ///   c_(Q + 1, 0), ... c_(Q + 1, T + 1) ]
    /// ```
    ///
    data: Vec<T>,
}

impl<T: Copy> DpMatrix<T> {
    /// Allocates the matrix, reporting failure instead of aborting.
    pub fn new(
        name: &'static str,
        query_length: usize,
        template_length: usize,
        fill: T,
    ) -> Result<Self, AlignError> {
        let rows = query_length + 2;
        let cols = template_length + 2;
        let allocation_error = || AlignError::Allocation {
            matrix: name,
            rows,
            cols,
        };

        let length = rows.checked_mul(cols).ok_or_else(allocation_error)?;

        let mut data = Vec::new();
        data.try_reserve_exact(length)
            .map_err(|_| allocation_error())?;
        data.resize(length, fill);

        Ok(Self {
            query_length,
            template_length,
            data,
        })
    }

    #[inline]
    fn index(&self, query_idx: usize, template_idx: usize) -> usize {
        debug_assert!(query_idx <= self.query_length + 1);
        debug_assert!(template_idx <= self.template_length + 1);
        query_idx * (self.template_length + 2) + template_idx
    }

    #[inline]
    pub fn get(&self, query_idx: usize, template_idx: usize) -> T {
        self.data[self.index(query_idx, template_idx)]
    }

    #[inline]
    pub fn set(&mut self, query_idx: usize, template_idx: usize, value: T) {
        let idx = self.index(query_idx, template_idx);
        self.data[idx] = value;
    }

    /// The cells of one query row, template columns 0..=template_length + 1.
    pub fn row(&self, query_idx: usize) -> &[T] {
        let start = self.index(query_idx, 0);
        &self.data[start..start + self.template_length + 2]
    }

    pub fn fill(&mut self, value: T) {
        self.data.iter_mut().for_each(|cell| *cell = value);
    }
}

impl<T: Copy + Display> DpMatrix<T> {
    pub fn dump(&self, out: &mut impl Write) -> Result<()> {
        let query_idx_width = self.query_length.to_string().len();
        let column_width = 10;
        let precision = 3;

        write!(out, "{}", " ".repeat(query_idx_width + 1))?;
        for template_idx in 0..=self.template_length {
            write!(out, "{:>w$} ", template_idx, w = column_width)?;
        }
        writeln!(out)?;

        for query_idx in 0..=self.query_length {
            write!(out, "{:w$} ", query_idx, w = query_idx_width)?;
            for template_idx in 0..=self.template_length {
                write!(
                    out,
                    "{:>w$.p$} ",
                    self.get(query_idx, template_idx),
                    w = column_width,
                    p = precision
                )?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    /// The `dump` layout as a string, for trace logging.
    pub fn dump_string(&self) -> String {
        let mut out = vec![];
        // writing into a Vec cannot fail
        let _ = self.dump(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}
