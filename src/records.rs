// 🏥 Facility & Financial Records - Typed input schema
//
// Both collections arrive fully materialized from the ingestion boundary and
// are read-only for every stage of the pipeline. Field names follow the
// camelCase columns of the state registry extracts.

use serde::{Deserialize, Serialize};

/// Opaque facility identifier assigned at ingestion.
pub type FacilityId = String;

// ============================================================================
// FACILITY
// ============================================================================

/// One physical/legal healthcare entity from the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Facility {
    /// Stable identity - never changes after ingestion
    pub id: FacilityId,

    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,

    pub in_service: bool,

    /// Owner / licensee
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_name: Option<String>,

    /// Administrator contact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
}

impl Facility {
    /// Create a facility with only identity and name set
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Facility {
            id: id.into(),
            name: name.into(),
            in_service: true,
            ..Default::default()
        }
    }

    /// Builder pattern: set license number
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license_number = Some(license.into());
        self
    }

    /// Builder pattern: set street address
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Builder pattern: set phone number
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Builder pattern: set owning business
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.business_name = Some(owner.into());
        self
    }

    /// Builder pattern: set administrator contact
    pub fn with_admin(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }
}

// ============================================================================
// FINANCIAL RECORD
// ============================================================================

/// One fiscal-year financial extract.
///
/// `facility_id` is filled in by the financial joiner; input records
/// normally leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FinancialRecord {
    pub license_number: Option<String>,
    pub facility_id: Option<FacilityId>,
    pub total_revenue: Option<f64>,
    pub total_expenses: Option<f64>,
    pub net_income: Option<f64>,
    pub total_visits: Option<i64>,
    pub year: Option<i32>,
}

impl FinancialRecord {
    pub fn new(license_number: Option<&str>, year: Option<i32>) -> Self {
        FinancialRecord {
            license_number: license_number.map(str::to_string),
            year,
            ..Default::default()
        }
    }

    /// Builder pattern: set revenue and net income
    pub fn with_figures(mut self, revenue: f64, net_income: f64) -> Self {
        self.total_revenue = Some(revenue);
        self.net_income = Some(net_income);
        self
    }

    /// Builder pattern: set expenses
    pub fn with_expenses(mut self, expenses: f64) -> Self {
        self.total_expenses = Some(expenses);
        self
    }

    /// Builder pattern: set visit count
    pub fn with_visits(mut self, visits: i64) -> Self {
        self.total_visits = Some(visits);
        self
    }

    /// Drop NaN and infinite figures, returning how many were dropped
    pub fn drop_non_finite(&mut self) -> usize {
        let mut dropped = 0;
        for figure in [
            &mut self.total_revenue,
            &mut self.total_expenses,
            &mut self.net_income,
        ] {
            if figure.map_or(false, |v| !v.is_finite()) {
                *figure = None;
                dropped += 1;
            }
        }
        dropped
    }

    /// Net income as reported, or revenue minus expenses when both are known
    pub fn effective_net_income(&self) -> Option<f64> {
        match (self.net_income, self.total_revenue, self.total_expenses) {
            (Some(net), _, _) => Some(net),
            (None, Some(revenue), Some(expenses)) => Some(revenue - expenses),
            _ => None,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
