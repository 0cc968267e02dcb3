// Copyright 2016-2019 Johannes Köster, David Lähnemann.
// Licensed under the GNU GPLv3 license (https://opensource.org/licenses/GPL-3.0)
// This file may not be copied, modified, or distributed
// except according to those terms.

use std::mem;

use anyhow::Result;

use itertools::izip;

use crate::errors::Error;
use crate::pairhmm::first_position_where_haplotypes_differ;
use crate::pairhmm::forward::{LoglessFloat, MatchEmission, Window};
use crate::pairhmm::transitions::Transition;

/// The inputs of the computation the lanes currently hold.
#[derive(Debug, Default)]
struct FilledPair {
    read_bases: Vec<u8>,
    read_quals: Vec<u8>,
    transitions: Vec<Transition>,
    haplotype: Vec<u8>,
    emission: Option<MatchEmission>,
}

/// The three DP lanes (match, insertion, deletion), each holding
/// `(max_read_len + 1) x (max_haplotype_len + 1)` cells in row-major order.
///
/// Row 0 and column 0 carry the boundary conditions. The deletion lane's row 0 holds the
/// scaled leading mass `INITIAL_CONDITION / M`, which lets the read start at any haplotype
/// position; every other boundary cell is zero.
#[derive(Debug)]
pub struct DpMatrix<T> {
    pub(crate) match_lane: Vec<T>,
    pub(crate) insertion_lane: Vec<T>,
    pub(crate) deletion_lane: Vec<T>,
    pub(crate) stride: usize,
    max_read_len: usize,
    max_haplotype_len: usize,
    initialized: bool,
    boundary_haplotype_len: Option<usize>,
    valid: bool,
    filled: FilledPair,
}

impl<T: LoglessFloat> DpMatrix<T> {
    pub fn new() -> Self {
        DpMatrix {
            match_lane: Vec::new(),
            insertion_lane: Vec::new(),
            deletion_lane: Vec::new(),
            stride: 0,
            max_read_len: 0,
            max_haplotype_len: 0,
            initialized: false,
            boundary_haplotype_len: None,
            valid: false,
            filled: FilledPair::default(),
        }
    }

    /// Number of bytes the three lanes occupy for the given maximum dimensions, `None` on
    /// overflow.
    pub fn required_bytes(max_read_len: usize, max_haplotype_len: usize) -> Option<usize> {
        (max_read_len.checked_add(1)?)
            .checked_mul(max_haplotype_len.checked_add(1)?)?
            .checked_mul(3 * mem::size_of::<T>())
    }

    /// Allocate the lanes for reads up to `max_read_len` and haplotypes up to
    /// `max_haplotype_len`. Calling this again with other dimensions reallocates.
    pub fn initialize(
        &mut self,
        max_read_len: usize,
        max_haplotype_len: usize,
        max_bytes: usize,
    ) -> Result<()> {
        if self.initialized
            && self.max_read_len == max_read_len
            && self.max_haplotype_len == max_haplotype_len
        {
            return Ok(());
        }

        let allocation_error = |bytes| Error::AllocationError {
            max_read_len,
            max_haplotype_len,
            bytes,
            limit: max_bytes,
        };
        let bytes = Self::required_bytes(max_read_len, max_haplotype_len)
            .ok_or_else(|| allocation_error(usize::MAX))?;
        if bytes > max_bytes {
            Err(allocation_error(bytes))?;
        }

        let cells = (max_read_len + 1) * (max_haplotype_len + 1);
        debug!(
            "allocating pair HMM lanes for {} x {} ({} bytes)",
            max_read_len, max_haplotype_len, bytes
        );
        for lane in [
            &mut self.match_lane,
            &mut self.insertion_lane,
            &mut self.deletion_lane,
        ]
        .iter_mut()
        {
            let mut buffer = Vec::new();
            buffer
                .try_reserve_exact(cells)
                .map_err(|_| allocation_error(bytes))?;
            buffer.resize(cells, T::zero());
            **lane = buffer;
        }

        self.stride = max_haplotype_len + 1;
        self.max_read_len = max_read_len;
        self.max_haplotype_len = max_haplotype_len;
        self.initialized = true;
        self.boundary_haplotype_len = None;
        self.valid = false;

        Ok(())
    }

    /// Fail with `Uninitialized` unless a read of `read_len` against a haplotype of
    /// `haplotype_len` fits into the allocated lanes.
    pub fn ensure_capacity(&self, read_len: usize, haplotype_len: usize) -> Result<()> {
        if !self.fits(read_len, haplotype_len) {
            Err(Error::Uninitialized {
                read_len,
                haplotype_len,
                max_read_len: self.max_read_len,
                max_haplotype_len: self.max_haplotype_len,
            })?;
        }
        Ok(())
    }

    pub fn fits(&self, read_len: usize, haplotype_len: usize) -> bool {
        self.initialized && read_len <= self.max_read_len && haplotype_len <= self.max_haplotype_len
    }

    /// Set row 0 and column 0 of all lanes for the given dimensions. Row 0 depends on the
    /// haplotype length only, hence it is rewritten only if that changed or `force` is set.
    pub fn seed_boundaries(&mut self, read_len: usize, haplotype_len: usize, force: bool) {
        if force || self.boundary_haplotype_len != Some(haplotype_len) {
            let leading = if haplotype_len > 0 {
                T::initial_condition() / T::from_prob(haplotype_len as f64)
            } else {
                T::zero()
            };
            for j in 0..=haplotype_len {
                self.match_lane[j] = T::zero();
                self.insertion_lane[j] = T::zero();
                self.deletion_lane[j] = leading;
            }
            self.boundary_haplotype_len = Some(haplotype_len);
        }
        for i in 1..=read_len {
            let idx = i * self.stride;
            self.match_lane[idx] = T::zero();
            self.insertion_lane[idx] = T::zero();
            self.deletion_lane[idx] = T::zero();
        }
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.stride + j
    }

    pub fn match_value(&self, i: usize, j: usize) -> T {
        self.match_lane[self.index(i, j)]
    }

    pub fn insertion_value(&self, i: usize, j: usize) -> T {
        self.insertion_lane[self.index(i, j)]
    }

    pub fn deletion_value(&self, i: usize, j: usize) -> T {
        self.deletion_lane[self.index(i, j)]
    }

    /// Record that the lanes hold a complete computation for the given pair.
    pub(crate) fn mark_valid(
        &mut self,
        read_bases: &[u8],
        read_quals: &[u8],
        transitions: &[Transition],
        haplotype: &[u8],
        emission: &MatchEmission,
    ) {
        let filled = &mut self.filled;
        filled.read_bases.clear();
        filled.read_bases.extend_from_slice(read_bases);
        filled.read_quals.clear();
        filled.read_quals.extend_from_slice(read_quals);
        filled.transitions.clear();
        filled.transitions.extend_from_slice(transitions);
        filled.haplotype.clear();
        filled.haplotype.extend_from_slice(haplotype);
        filled.emission = Some(*emission);
        self.valid = true;
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Whether the lanes hold a complete computation for a pair of the given dimensions.
    pub fn is_valid_for(&self, read_len: usize, haplotype_len: usize) -> bool {
        self.valid
            && self.filled.read_bases.len() == read_len
            && self.filled.haplotype.len() == haplotype_len
    }

    /// Restrict the requested window to the cells that the held computation shares with the
    /// given pair. Cells of row `i` and column `j` are kept only if the first `i` read
    /// positions (bases, qualities and transitions) and the first `j` haplotype bases are
    /// identical. Returns the full window if no cell can be kept.
    pub fn reusable_window(
        &self,
        window: &Window,
        read_bases: &[u8],
        read_quals: &[u8],
        transitions: &[Transition],
        haplotype: &[u8],
        emission: &MatchEmission,
    ) -> Window {
        if !self.is_valid_for(read_bases.len(), haplotype.len())
            || self.filled.emission.as_ref() != Some(emission)
        {
            return Window::full();
        }

        let filled = &self.filled;
        let shared_rows = izip!(&filled.read_bases, &filled.read_quals, &filled.transitions)
            .zip(izip!(read_bases, read_quals, transitions))
            .take_while(|(held, given)| held == given)
            .count();
        let shared_cols = first_position_where_haplotypes_differ(&filled.haplotype, haplotype);

        if shared_rows == read_bases.len() {
            Window::new(
                window.row_start,
                window.col_start.min(shared_cols),
                window.hap_start_offset.min(shared_cols),
            )
        } else {
            // columns kept in every row require the complete read to be unchanged
            let row_start = window.row_start.min(shared_rows);
            if row_start == 0 {
                return Window::full();
            }
            Window::new(
                row_start,
                window
                    .col_start
                    .max(window.hap_start_offset)
                    .min(shared_cols),
                0,
            )
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn max_read_len(&self) -> usize {
        self.max_read_len
    }

    pub fn max_haplotype_len(&self) -> usize {
        self.max_haplotype_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized() {
        let matrix = DpMatrix::<f64>::new();
        let err = matrix.ensure_capacity(4, 4).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Uninitialized { .. })
        ));
    }

    #[test]
    fn test_allocation_limit() {
        let mut matrix = DpMatrix::<f64>::new();
        let err = matrix.initialize(1000, 1000, 1 << 20).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::AllocationError {
                max_read_len: 1000,
                max_haplotype_len: 1000,
                bytes: 1001 * 1001 * 24,
                limit: 1 << 20,
            })
        );
        assert!(!matrix.is_initialized());

        let err = matrix.initialize(usize::MAX, 2, usize::MAX).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::AllocationError { .. })
        ));
    }

    #[test]
    fn test_smaller_pairs_fit() {
        let mut matrix = DpMatrix::<f32>::new();
        matrix.initialize(10, 20, 1 << 20).unwrap();
        assert!(matrix.ensure_capacity(10, 20).is_ok());
        assert!(matrix.ensure_capacity(3, 7).is_ok());
        assert!(matrix.ensure_capacity(11, 20).is_err());
        assert!(matrix.ensure_capacity(10, 21).is_err());
    }

    #[test]
    fn test_boundaries() {
        let mut matrix = DpMatrix::<f64>::new();
        matrix.initialize(3, 4, 1 << 20).unwrap();
        matrix.seed_boundaries(3, 4, true);
        let leading = 2f64.powi(1020) / 4.0;
        for j in 0..=4 {
            assert_eq!(matrix.deletion_value(0, j), leading);
            assert_eq!(matrix.match_value(0, j), 0.0);
            assert_eq!(matrix.insertion_value(0, j), 0.0);
        }
        for i in 1..=3 {
            assert_eq!(matrix.match_value(i, 0), 0.0);
            assert_eq!(matrix.insertion_value(i, 0), 0.0);
            assert_eq!(matrix.deletion_value(i, 0), 0.0);
        }

        matrix.seed_boundaries(3, 2, false);
        assert_eq!(matrix.deletion_value(0, 0), 2f64.powi(1020) / 2.0);
    }

    fn mark(matrix: &mut DpMatrix<f64>, read: &[u8], quals: &[u8], haplotype: &[u8]) {
        let (transition, _) = Transition::from_quals(45, 45, 10);
        matrix.mark_valid(
            read,
            quals,
            &vec![transition; read.len()],
            haplotype,
            &MatchEmission::new(true),
        );
    }

    fn reusable(
        matrix: &DpMatrix<f64>,
        window: Window,
        read: &[u8],
        quals: &[u8],
        haplotype: &[u8],
    ) -> Window {
        let (transition, _) = Transition::from_quals(45, 45, 10);
        matrix.reusable_window(
            &window,
            read,
            quals,
            &vec![transition; read.len()],
            haplotype,
            &MatchEmission::new(true),
        )
    }

    #[test]
    fn test_reusable_window() {
        let mut matrix = DpMatrix::<f64>::new();
        matrix.initialize(8, 8, 1 << 20).unwrap();
        assert_eq!(
            reusable(&matrix, Window::new(0, 0, 2), b"ACGT", &[30; 4], b"ACGTAC"),
            Window::full()
        );

        mark(&mut matrix, b"ACGT", &[30; 4], b"ACGTAC");
        assert!(matrix.is_valid_for(4, 6));
        // same read, haplotype differing from column 4 on
        assert_eq!(
            reusable(&matrix, Window::new(0, 0, 3), b"ACGT", &[30; 4], b"ACGTTC"),
            Window::new(0, 0, 3)
        );
        // an overstated offset is cut back to the shared haplotype prefix
        assert_eq!(
            reusable(&matrix, Window::new(0, 0, 6), b"ACGT", &[30; 4], b"ACTTAC"),
            Window::new(0, 0, 2)
        );
        // another read of the same length keeps nothing in every row
        assert_eq!(
            reusable(&matrix, Window::new(0, 0, 3), b"TTTT", &[30; 4], b"ACGTAC"),
            Window::full()
        );
        // a read sharing a prefix keeps the rows of that prefix only
        assert_eq!(
            reusable(&matrix, Window::new(3, 2, 4), b"ACGA", &[30; 4], b"ACGTAC"),
            Window::new(3, 4, 0)
        );
        // changed qualities count as a different read
        assert_eq!(
            reusable(&matrix, Window::new(3, 4, 0), b"ACGT", &[20, 30, 30, 30], b"ACGTAC"),
            Window::full()
        );
        // other dimensions
        assert_eq!(
            reusable(&matrix, Window::new(0, 0, 3), b"ACGT", &[30; 4], b"ACGTA"),
            Window::full()
        );

        matrix.invalidate();
        assert!(!matrix.is_valid_for(4, 6));
    }

    #[test]
    fn test_empty_haplotype_has_no_leading_mass() {
        let mut matrix = DpMatrix::<f64>::new();
        matrix.initialize(3, 4, 1 << 20).unwrap();
        matrix.seed_boundaries(3, 0, true);
        assert_eq!(matrix.deletion_value(0, 0), 0.0);
    }
}
