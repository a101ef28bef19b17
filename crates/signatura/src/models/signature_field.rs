/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Visible signature placement on a page.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a signature appearance is drawn, in PDF user-space units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureField {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Signer whose signature fills this field, if bound.
    pub signer_id: Option<Uuid>,
    /// 1-based page number.
    pub page: i32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub show_name: bool,
    pub show_date: bool,
    pub show_reason: bool,
    pub reason: Option<String>,
}

impl SignatureField {
    /// Checks the geometric invariants (page ≥ 1, positive size, finite coordinates).
    pub fn validate(&self) -> Result<(), String> {
        if self.page < 1 {
            return Err(format!("field page must be >= 1, got {}", self.page));
        }
        if !(self.width > 0.0 && self.height > 0.0) {
            return Err(format!(
                "field width and height must be positive, got {}x{}",
                self.width, self.height
            ));
        }
        if !(self.x.is_finite() && self.y.is_finite()) {
            return Err("field coordinates must be finite".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> SignatureField {
        SignatureField {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            signer_id: None,
            page: 1,
            x: 72.0,
            y: 100.0,
            width: 200.0,
            height: 50.0,
            show_name: true,
            show_date: true,
            show_reason: false,
            reason: None,
        }
    }

    #[test]
    fn test_valid_field() {
        assert!(field().validate().is_ok());
    }

    #[test]
    fn test_rejects_page_zero_and_empty_box() {
        let mut f = field();
        f.page = 0;
        assert!(f.validate().is_err());

        let mut f = field();
        f.height = 0.0;
        assert!(f.validate().is_err());

        let mut f = field();
        f.width = f64::NAN;
        assert!(f.validate().is_err());
    }
}
