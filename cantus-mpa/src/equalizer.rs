// Cantus
// Copyright (c) 2023-2024 The Project Cantus Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use cantus_core::errors::{Error, Result};

use log::warn;

use crate::common::SUBBANDS;

/// The number of equalizer bands, one per subband of the synthesis filterbank.
pub const EQ_BANDS: usize = SUBBANDS;

/// A 32-band graphic equalizer.
///
/// Each band holds a value in the range [-1.0, 1.0]. A value of 0.0 leaves the band unchanged, and
/// a value of -1.0 mutes it. The gain applied to a subband is `1.0 + value`.
///
/// An `Equalizer` is a plain value. Handing one to a decoder copies it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Equalizer {
    bands: [f32; EQ_BANDS],
}

impl Default for Equalizer {
    fn default() -> Self {
        Equalizer { bands: [0.0; EQ_BANDS] }
    }
}

impl Equalizer {
    /// Instantiate a flat equalizer.
    pub fn new() -> Self {
        Default::default()
    }

    /// Instantiate an equalizer from up-to 32 band values. Missing bands are flat, and values are
    /// clamped to [-1.0, 1.0].
    pub fn from_values(values: &[f32]) -> Self {
        let mut eq = Equalizer::new();

        for (band, &value) in eq.bands.iter_mut().zip(values) {
            *band = clamp_band(value);
        }

        eq
    }

    /// Sets the value of a band. The value is clamped to [-1.0, 1.0]. Returns an error if the band
    /// index is out-of-range.
    pub fn set_band(&mut self, band: usize, value: f32) -> Result<()> {
        match self.bands.get_mut(band) {
            Some(slot) => {
                *slot = clamp_band(value);
                Ok(())
            }
            None => Err(Error::BandOutOfRange(band)),
        }
    }

    /// Gets the value of a band, or `None` if the band index is out-of-range.
    pub fn band(&self, band: usize) -> Option<f32> {
        self.bands.get(band).copied()
    }

    /// Gets all band values.
    pub fn bands(&self) -> &[f32; EQ_BANDS] {
        &self.bands
    }

    /// Returns true if every band is 0.0.
    pub fn is_flat(&self) -> bool {
        self.bands.iter().all(|&band| band == 0.0)
    }

    /// Resets all bands to 0.0.
    pub fn reset(&mut self) {
        self.bands = [0.0; EQ_BANDS];
    }

    /// Computes the multiplicative gain of each subband.
    pub fn band_factors(&self) -> [f32; EQ_BANDS] {
        let mut factors = [1.0; EQ_BANDS];

        for (factor, &band) in factors.iter_mut().zip(&self.bands) {
            *factor = 1.0 + band;
        }

        factors
    }
}

#[inline]
fn clamp_band(value: f32) -> f32 {
    if value.is_nan() {
        warn!("equalizer: NaN band value replaced with 0.0");
        return 0.0;
    }

    if value < -1.0 || value > 1.0 {
        warn!("equalizer: band value {} clamped", value);
    }

    value.clamp(-1.0, 1.0)
}
