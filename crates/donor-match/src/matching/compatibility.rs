use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Availability, BloodGroup, Donor, ProductCategory, RecipientRequest, RequestStatus,
};

/// Blood-group relationship between a donor and a recipient for one product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    Incompatible,
    /// Usable, but not preferred (e.g. ABO-mismatched platelets).
    Tolerated,
    Compatible,
    Identical,
}

impl Compatibility {
    pub const fn permits(self) -> bool {
        !matches!(self, Compatibility::Incompatible)
    }
}

type GroupTable = BTreeMap<BloodGroup, BTreeMap<BloodGroup, Compatibility>>;

/// Donor -> recipient compatibility table per product category.
///
/// Lookups are total: any pair absent from the table is `Incompatible`, so a
/// partially specified override can only narrow eligibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityMatrix {
    tables: BTreeMap<ProductCategory, GroupTable>,
}

impl CompatibilityMatrix {
    /// Empty matrix; every pair is incompatible until entries are set.
    pub fn empty() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }

    /// Standard ABO/Rh rules.
    ///
    /// * red cells: donor antigens (A, B, RhD) must be a subset of the recipient's
    /// * plasma: transpose of the red-cell table
    /// * platelets: red-cell rules, otherwise tolerated
    /// * solid organ and marrow: ABO subset only, Rh ignored
    pub fn standard() -> Self {
        let mut matrix = Self::empty();

        for donor in BloodGroup::ALL {
            for recipient in BloodGroup::ALL {
                let red_cells = red_cell_rule(donor, recipient);
                let plasma = red_cell_rule(recipient, donor);
                let platelets = if red_cells.permits() {
                    red_cells
                } else {
                    Compatibility::Tolerated
                };
                let organ = abo_rule(donor, recipient);

                matrix.set(ProductCategory::RedCells, donor, recipient, red_cells);
                matrix.set(ProductCategory::Plasma, donor, recipient, plasma);
                matrix.set(ProductCategory::Platelets, donor, recipient, platelets);
                matrix.set(ProductCategory::SolidOrgan, donor, recipient, organ);
                matrix.set(ProductCategory::Marrow, donor, recipient, organ);
            }
        }

        matrix
    }

    pub fn set(
        &mut self,
        category: ProductCategory,
        donor: BloodGroup,
        recipient: BloodGroup,
        compatibility: Compatibility,
    ) {
        self.tables
            .entry(category)
            .or_default()
            .entry(donor)
            .or_default()
            .insert(recipient, compatibility);
    }

    pub fn with_entry(
        mut self,
        category: ProductCategory,
        donor: BloodGroup,
        recipient: BloodGroup,
        compatibility: Compatibility,
    ) -> Self {
        self.set(category, donor, recipient, compatibility);
        self
    }

    pub fn lookup(
        &self,
        category: ProductCategory,
        donor: BloodGroup,
        recipient: BloodGroup,
    ) -> Compatibility {
        self.tables
            .get(&category)
            .and_then(|table| table.get(&donor))
            .and_then(|row| row.get(&recipient))
            .copied()
            .unwrap_or(Compatibility::Incompatible)
    }
}

impl Default for CompatibilityMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

fn red_cell_rule(donor: BloodGroup, recipient: BloodGroup) -> Compatibility {
    let antigens_covered = (!donor.has_a_antigen() || recipient.has_a_antigen())
        && (!donor.has_b_antigen() || recipient.has_b_antigen())
        && (!donor.is_rh_positive() || recipient.is_rh_positive());

    if donor == recipient {
        Compatibility::Identical
    } else if antigens_covered {
        Compatibility::Compatible
    } else {
        Compatibility::Incompatible
    }
}

fn abo_rule(donor: BloodGroup, recipient: BloodGroup) -> Compatibility {
    let abo_covered = (!donor.has_a_antigen() || recipient.has_a_antigen())
        && (!donor.has_b_antigen() || recipient.has_b_antigen());

    if donor == recipient {
        Compatibility::Identical
    } else if abo_covered {
        Compatibility::Compatible
    } else {
        Compatibility::Incompatible
    }
}

/// Pure eligibility gate applied to every (donor, recipient) pair.
#[derive(Debug, Clone, Default)]
pub struct CompatibilityEvaluator {
    matrix: CompatibilityMatrix,
}

impl CompatibilityEvaluator {
    pub fn new(matrix: CompatibilityMatrix) -> Self {
        Self { matrix }
    }

    pub fn matrix(&self) -> &CompatibilityMatrix {
        &self.matrix
    }

    /// Blood-group relationship for the recipient's requested product.
    pub fn blood_compatibility(&self, donor: &Donor, recipient: &RecipientRequest) -> Compatibility {
        self.matrix.lookup(
            recipient.organ_type.category(),
            donor.blood_group,
            recipient.blood_group,
        )
    }

    pub fn is_eligible(&self, donor: &Donor, recipient: &RecipientRequest) -> bool {
        donor.verified
            && donor.availability == Availability::Active
            && recipient.verified
            && recipient.status == RequestStatus::Verified
            && donor.can_donate(recipient.organ_type)
            && self.blood_compatibility(donor, recipient).permits()
    }
}
