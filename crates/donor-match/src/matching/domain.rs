use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registered donors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DonorId(pub String);

/// Identifier wrapper for recipient requests.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecipientId(pub String);

/// Identifier wrapper for persisted matches.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl fmt::Display for DonorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The eight recognised ABO/Rh blood groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BloodGroup {
    #[serde(rename = "O-")]
    ONegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "AB+")]
    AbPositive,
}

impl BloodGroup {
    pub const ALL: [BloodGroup; 8] = [
        BloodGroup::ONegative,
        BloodGroup::OPositive,
        BloodGroup::ANegative,
        BloodGroup::APositive,
        BloodGroup::BNegative,
        BloodGroup::BPositive,
        BloodGroup::AbNegative,
        BloodGroup::AbPositive,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            BloodGroup::ONegative => "O-",
            BloodGroup::OPositive => "O+",
            BloodGroup::ANegative => "A-",
            BloodGroup::APositive => "A+",
            BloodGroup::BNegative => "B-",
            BloodGroup::BPositive => "B+",
            BloodGroup::AbNegative => "AB-",
            BloodGroup::AbPositive => "AB+",
        }
    }

    pub const fn has_a_antigen(self) -> bool {
        matches!(
            self,
            BloodGroup::ANegative
                | BloodGroup::APositive
                | BloodGroup::AbNegative
                | BloodGroup::AbPositive
        )
    }

    pub const fn has_b_antigen(self) -> bool {
        matches!(
            self,
            BloodGroup::BNegative
                | BloodGroup::BPositive
                | BloodGroup::AbNegative
                | BloodGroup::AbPositive
        )
    }

    pub const fn is_rh_positive(self) -> bool {
        matches!(
            self,
            BloodGroup::OPositive
                | BloodGroup::APositive
                | BloodGroup::BPositive
                | BloodGroup::AbPositive
        )
    }

    /// True when both groups carry the same A/B antigens, ignoring Rh.
    pub const fn same_abo(self, other: BloodGroup) -> bool {
        self.has_a_antigen() == other.has_a_antigen()
            && self.has_b_antigen() == other.has_b_antigen()
    }
}

impl fmt::Display for BloodGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BloodGroup {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        if normalized.is_empty() {
            return Err(ValidationError::MissingBloodGroup);
        }

        let group = match normalized.as_str() {
            "o-" | "o_neg" | "o_negative" => BloodGroup::ONegative,
            "o+" | "o_pos" | "o_positive" => BloodGroup::OPositive,
            "a-" | "a_neg" | "a_negative" => BloodGroup::ANegative,
            "a+" | "a_pos" | "a_positive" => BloodGroup::APositive,
            "b-" | "b_neg" | "b_negative" => BloodGroup::BNegative,
            "b+" | "b_pos" | "b_positive" => BloodGroup::BPositive,
            "ab-" | "ab_neg" | "ab_negative" => BloodGroup::AbNegative,
            "ab+" | "ab_pos" | "ab_positive" => BloodGroup::AbPositive,
            _ => return Err(ValidationError::UnknownBloodGroup(raw.trim().to_string())),
        };

        Ok(group)
    }
}

/// Organ or blood product a donor can give and a recipient can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrganType {
    Kidney,
    PartialLiver,
    Lung,
    Pancreas,
    WholeBlood,
    RedCells,
    Plasma,
    Platelets,
    BoneMarrow,
}

impl OrganType {
    pub const ALL: [OrganType; 9] = [
        OrganType::Kidney,
        OrganType::PartialLiver,
        OrganType::Lung,
        OrganType::Pancreas,
        OrganType::WholeBlood,
        OrganType::RedCells,
        OrganType::Plasma,
        OrganType::Platelets,
        OrganType::BoneMarrow,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            OrganType::Kidney => "kidney",
            OrganType::PartialLiver => "partial_liver",
            OrganType::Lung => "lung",
            OrganType::Pancreas => "pancreas",
            OrganType::WholeBlood => "whole_blood",
            OrganType::RedCells => "red_cells",
            OrganType::Plasma => "plasma",
            OrganType::Platelets => "platelets",
            OrganType::BoneMarrow => "bone_marrow",
        }
    }

    pub const fn category(self) -> ProductCategory {
        match self {
            OrganType::Kidney | OrganType::PartialLiver | OrganType::Lung | OrganType::Pancreas => {
                ProductCategory::SolidOrgan
            }
            OrganType::WholeBlood | OrganType::RedCells => ProductCategory::RedCells,
            OrganType::Plasma => ProductCategory::Plasma,
            OrganType::Platelets => ProductCategory::Platelets,
            OrganType::BoneMarrow => ProductCategory::Marrow,
        }
    }

    /// Solid organs can be given once; blood products and marrow regenerate.
    pub const fn is_renewable(self) -> bool {
        !matches!(self.category(), ProductCategory::SolidOrgan)
    }
}

impl fmt::Display for OrganType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for OrganType {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        if normalized.is_empty() {
            return Err(ValidationError::MissingOrganType);
        }

        let organ = match normalized.as_str() {
            "kidney" => OrganType::Kidney,
            "partial_liver" | "liver" => OrganType::PartialLiver,
            "lung" => OrganType::Lung,
            "pancreas" => OrganType::Pancreas,
            "whole_blood" | "blood" => OrganType::WholeBlood,
            "red_cells" | "red_blood_cells" => OrganType::RedCells,
            "plasma" | "blood_plasma" => OrganType::Plasma,
            "platelets" | "blood_platelets" => OrganType::Platelets,
            "bone_marrow" | "marrow" => OrganType::BoneMarrow,
            _ => return Err(ValidationError::UnknownOrganType(raw.trim().to_string())),
        };

        Ok(organ)
    }
}

/// Compatibility rule families; each organ type maps onto exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    RedCells,
    Plasma,
    Platelets,
    SolidOrgan,
    Marrow,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        ProductCategory::RedCells,
        ProductCategory::Plasma,
        ProductCategory::Platelets,
        ProductCategory::SolidOrgan,
        ProductCategory::Marrow,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Active,
    Paused,
    Unavailable,
}

/// Recipient-declared severity used to weight allocation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Low,
    Medium,
    High,
    Critical,
}

impl UrgencyTier {
    pub const fn label(self) -> &'static str {
        match self {
            UrgencyTier::Low => "low",
            UrgencyTier::Medium => "medium",
            UrgencyTier::High => "high",
            UrgencyTier::Critical => "critical",
        }
    }
}

impl FromStr for UrgencyTier {
    type Err = ValidationError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(UrgencyTier::Low),
            "medium" => Ok(UrgencyTier::Medium),
            "high" => Ok(UrgencyTier::High),
            "critical" => Ok(UrgencyTier::Critical),
            other => Err(ValidationError::UnknownUrgency(other.to_string())),
        }
    }
}

/// Lifecycle of a recipient request; only `Verified` requests are matchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    UnderReview,
    Verified,
    Matched,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::UnderReview => "under_review",
            RequestStatus::Verified => "verified",
            RequestStatus::Matched => "matched",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle of a match. Only `Proposed` is written by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Proposed,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            MatchStatus::Proposed => "proposed",
            MatchStatus::Approved => "approved",
            MatchStatus::Rejected => "rejected",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    /// Non-terminal matches hold donor capacity.
    pub const fn is_active(self) -> bool {
        matches!(self, MatchStatus::Proposed | MatchStatus::Approved)
    }

    pub const fn can_transition_to(self, next: MatchStatus) -> bool {
        matches!(
            (self, next),
            (MatchStatus::Proposed, MatchStatus::Approved)
                | (MatchStatus::Proposed, MatchStatus::Rejected)
                | (MatchStatus::Proposed, MatchStatus::Cancelled)
                | (MatchStatus::Approved, MatchStatus::Completed)
                | (MatchStatus::Approved, MatchStatus::Cancelled)
        )
    }
}

/// Row-shaped donor as held by the profile store. Blood group and organ types are
/// free text until converted into a [`Donor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorRecord {
    pub id: DonorId,
    pub blood_group: String,
    pub organ_types: Vec<String>,
    pub availability: Availability,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Row-shaped recipient request as held by the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRecord {
    pub id: RecipientId,
    pub organ_type: String,
    pub blood_group: String,
    pub urgency: UrgencyTier,
    pub verified: bool,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// Validated donor the evaluator and scoring function operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Donor {
    pub id: DonorId,
    pub blood_group: BloodGroup,
    pub organ_types: BTreeSet<OrganType>,
    pub availability: Availability,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Donor {
    pub fn can_donate(&self, organ_type: OrganType) -> bool {
        self.organ_types.contains(&organ_type)
    }
}

/// Validated recipient request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientRequest {
    pub id: RecipientId,
    pub organ_type: OrganType,
    pub blood_group: BloodGroup,
    pub urgency: UrgencyTier,
    pub verified: bool,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&DonorRecord> for Donor {
    type Error = ValidationError;

    fn try_from(record: &DonorRecord) -> Result<Self, Self::Error> {
        let blood_group = record.blood_group.parse::<BloodGroup>()?;
        let organ_types = record
            .organ_types
            .iter()
            .map(|raw| raw.parse::<OrganType>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        if organ_types.is_empty() {
            return Err(ValidationError::MissingOrganType);
        }

        Ok(Self {
            id: record.id.clone(),
            blood_group,
            organ_types,
            availability: record.availability,
            verified: record.verified,
            created_at: record.created_at,
        })
    }
}

impl TryFrom<&RecipientRecord> for RecipientRequest {
    type Error = ValidationError;

    fn try_from(record: &RecipientRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id.clone(),
            organ_type: record.organ_type.parse()?,
            blood_group: record.blood_group.parse()?,
            urgency: record.urgency,
            verified: record.verified,
            status: record.status,
            created_at: record.created_at,
        })
    }
}

/// The engine's sole write product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub donor_id: DonorId,
    pub recipient_id: RecipientId,
    pub organ_type: OrganType,
    pub score: f64,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

/// Reasons a stored row cannot become a typed entity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("blood group is missing")]
    MissingBloodGroup,
    #[error("unrecognised blood group '{0}'")]
    UnknownBloodGroup(String),
    #[error("organ type is missing")]
    MissingOrganType,
    #[error("unrecognised organ type '{0}'")]
    UnknownOrganType(String),
    #[error("unrecognised urgency tier '{0}'")]
    UnknownUrgency(String),
}
