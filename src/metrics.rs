/// Returned when font metrics would break their sign constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid font metrics: {0}")]
pub struct InvalidMetrics(&'static str);

/// Vertical metrics of a rendered string, in pixels.
///
/// Ascender and descender come from the face. The internal and external
/// leadings grow while rendering to cover glyphs that reach above the
/// ascender (e.g. `Å`) or below the descender.
///
/// Sign constraints: `internal_leading >= 0`, `ascender >= 0`,
/// `descender <= 0`, `external_leading <= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FontMetrics {
    base_line: i32,
    internal_leading: i32,
    ascender: i32,
    descender: i32,
    external_leading: i32,
}

impl FontMetrics {
    pub fn new(
        base_line: i32,
        internal_leading: i32,
        ascender: i32,
        descender: i32,
        external_leading: i32,
    ) -> Result<Self, InvalidMetrics> {
        check_internal_leading(internal_leading)?;
        check_ascender(ascender)?;
        check_descender(descender)?;
        check_external_leading(external_leading)?;
        Ok(Self {
            base_line,
            internal_leading,
            ascender,
            descender,
            external_leading,
        })
    }

    pub fn base_line(&self) -> i32 {
        self.base_line
    }

    pub fn set_base_line(&mut self, base_line: i32) {
        self.base_line = base_line;
    }

    pub fn internal_leading(&self) -> i32 {
        self.internal_leading
    }

    pub fn set_internal_leading(&mut self, internal_leading: i32) -> Result<(), InvalidMetrics> {
        check_internal_leading(internal_leading)?;
        self.internal_leading = internal_leading;
        Ok(())
    }

    pub fn ascender(&self) -> i32 {
        self.ascender
    }

    pub fn set_ascender(&mut self, ascender: i32) -> Result<(), InvalidMetrics> {
        check_ascender(ascender)?;
        self.ascender = ascender;
        Ok(())
    }

    pub fn descender(&self) -> i32 {
        self.descender
    }

    pub fn set_descender(&mut self, descender: i32) -> Result<(), InvalidMetrics> {
        check_descender(descender)?;
        self.descender = descender;
        Ok(())
    }

    pub fn external_leading(&self) -> i32 {
        self.external_leading
    }

    pub fn set_external_leading(&mut self, external_leading: i32) -> Result<(), InvalidMetrics> {
        check_external_leading(external_leading)?;
        self.external_leading = external_leading;
        Ok(())
    }

    /// Total height covered by the metrics.
    pub fn total(&self) -> i32 {
        self.internal_leading + self.ascender - self.descender - self.external_leading
    }

    /// Grows the leadings so that a glyph spanning `top..bottom`
    /// (relative to the baseline, y up) fits. The baseline moves down
    /// by however much the internal leading grew.
    pub(crate) fn expand_to_fit(&mut self, top: i32, bottom: i32) {
        let internal_leading = self.internal_leading.max(top - self.ascender);
        let external_leading = self.external_leading.min(bottom - self.descender);
        self.base_line += internal_leading - self.internal_leading;
        self.internal_leading = internal_leading;
        self.external_leading = external_leading;
    }
}

fn check_internal_leading(value: i32) -> Result<(), InvalidMetrics> {
    if value < 0 {
        return Err(InvalidMetrics("internal leading must not be negative"));
    }
    Ok(())
}

fn check_ascender(value: i32) -> Result<(), InvalidMetrics> {
    if value < 0 {
        return Err(InvalidMetrics("ascender must not be negative"));
    }
    Ok(())
}

fn check_descender(value: i32) -> Result<(), InvalidMetrics> {
    if value > 0 {
        return Err(InvalidMetrics("descender must not be positive"));
    }
    Ok(())
}

fn check_external_leading(value: i32) -> Result<(), InvalidMetrics> {
    if value > 0 {
        return Err(InvalidMetrics("external leading must not be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_height() {
        let metrics = FontMetrics::new(16, 2, 16, -4, -1).unwrap();
        assert_eq!(metrics.total(), 2 + 16 + 4 + 1);
    }

    #[test]
    fn sign_constraints_are_enforced() {
        assert!(FontMetrics::new(0, -1, 10, -2, 0).is_err());
        assert!(FontMetrics::new(0, 0, -10, -2, 0).is_err());
        assert!(FontMetrics::new(0, 0, 10, 2, 0).is_err());
        assert!(FontMetrics::new(0, 0, 10, -2, 1).is_err());

        let mut metrics = FontMetrics::new(10, 0, 10, -2, 0).unwrap();
        assert!(metrics.set_descender(3).is_err());
        assert_eq!(metrics.descender(), -2);
        assert!(metrics.set_internal_leading(4).is_ok());
        assert_eq!(metrics.internal_leading(), 4);
    }

    #[test]
    fn expanding_keeps_signs() {
        let mut metrics = FontMetrics::new(10, 0, 10, -3, 0).unwrap();
        metrics.expand_to_fit(13, -5);
        assert_eq!(metrics.internal_leading(), 3);
        assert_eq!(metrics.external_leading(), -2);
        assert_eq!(metrics.base_line(), 13);
        assert_eq!(metrics.total(), 3 + 10 + 3 + 2);

        // Glyphs inside the box change nothing.
        metrics.expand_to_fit(5, -1);
        assert_eq!(metrics.total(), 18);
    }
}
