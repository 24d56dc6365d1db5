//! Non-staff expense catalog.
//!
//! Cost categories and expense types form a closed, two-level code
//! table.  Each [`ExpenseType`] belongs to exactly one [`CostCategory`];
//! the mapping is explicit in [`ExpenseType::category`] and is what
//! non-staff line validation checks against.  Codes are the stable wire
//! values, labels are for display only.

use serde::{Deserialize, Serialize};

/// Top-level grouping for non-staff costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CostCategory {
    Adv,
    Cons,
    Data,
    EquipUtil,
    Expert,
    OtherCons,
    Phd,
    Shared,
    TravelEnt,
}

impl CostCategory {
    pub const ALL: [CostCategory; 9] = [
        CostCategory::Adv,
        CostCategory::Cons,
        CostCategory::Data,
        CostCategory::EquipUtil,
        CostCategory::Expert,
        CostCategory::OtherCons,
        CostCategory::Phd,
        CostCategory::Shared,
        CostCategory::TravelEnt,
    ];

    pub const fn code(self) -> &'static str {
        match self {
            CostCategory::Adv => "ADV",
            CostCategory::Cons => "CONS",
            CostCategory::Data => "DATA",
            CostCategory::EquipUtil => "EQUIP_UTIL",
            CostCategory::Expert => "EXPERT",
            CostCategory::OtherCons => "OTHER_CONS",
            CostCategory::Phd => "PHD",
            CostCategory::Shared => "SHARED",
            CostCategory::TravelEnt => "TRAVEL_ENT",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            CostCategory::Adv => "Advertising and marketing",
            CostCategory::Cons => "Consumable Goods and Supplies",
            CostCategory::Data => "Data Management",
            CostCategory::EquipUtil => "Equipment and maintenance and utilities",
            CostCategory::Expert => "Expert Services and Consultants and Contractors",
            CostCategory::OtherCons => "Other consumable service",
            CostCategory::Phd => "PhD Stipends",
            CostCategory::Shared => "Shared Grant Payments",
            CostCategory::TravelEnt => "Travel and entertainment",
        }
    }
}

/// Concrete expense type; a child of exactly one [`CostCategory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseType {
    AdvPromo,
    ConsGoods,
    ConsLibrary,
    DataSwServices,
    EquipMajor,
    EquipMinor,
    EquipRental,
    EquipRepairs,
    EquipUtilities,
    ExpConsultants,
    ExpTempLabour,
    ExpContractedSvc,
    ExpOther,
    OcsOpenAccess,
    OcsProfMembership,
    PhdOtherSupport,
    SharedHeps,
    TravelEntCater,
    TravelStaffConf,
}

impl ExpenseType {
    pub const ALL: [ExpenseType; 19] = [
        ExpenseType::AdvPromo,
        ExpenseType::ConsGoods,
        ExpenseType::ConsLibrary,
        ExpenseType::DataSwServices,
        ExpenseType::EquipMajor,
        ExpenseType::EquipMinor,
        ExpenseType::EquipRental,
        ExpenseType::EquipRepairs,
        ExpenseType::EquipUtilities,
        ExpenseType::ExpConsultants,
        ExpenseType::ExpTempLabour,
        ExpenseType::ExpContractedSvc,
        ExpenseType::ExpOther,
        ExpenseType::OcsOpenAccess,
        ExpenseType::OcsProfMembership,
        ExpenseType::PhdOtherSupport,
        ExpenseType::SharedHeps,
        ExpenseType::TravelEntCater,
        ExpenseType::TravelStaffConf,
    ];

    /// Parent category.
    pub const fn category(self) -> CostCategory {
        use ExpenseType::*;
        match self {
            AdvPromo => CostCategory::Adv,
            ConsGoods | ConsLibrary => CostCategory::Cons,
            DataSwServices => CostCategory::Data,
            EquipMajor | EquipMinor | EquipRental | EquipRepairs | EquipUtilities => {
                CostCategory::EquipUtil
            }
            ExpConsultants | ExpTempLabour | ExpContractedSvc | ExpOther => CostCategory::Expert,
            OcsOpenAccess | OcsProfMembership => CostCategory::OtherCons,
            PhdOtherSupport => CostCategory::Phd,
            SharedHeps => CostCategory::Shared,
            TravelEntCater | TravelStaffConf => CostCategory::TravelEnt,
        }
    }

    pub const fn code(self) -> &'static str {
        use ExpenseType::*;
        match self {
            AdvPromo => "ADV_PROMO",
            ConsGoods => "CONS_GOODS",
            ConsLibrary => "CONS_LIBRARY",
            DataSwServices => "DATA_SW_SERVICES",
            EquipMajor => "EQUIP_MAJOR",
            EquipMinor => "EQUIP_MINOR",
            EquipRental => "EQUIP_RENTAL",
            EquipRepairs => "EQUIP_REPAIRS",
            EquipUtilities => "EQUIP_UTILITIES",
            ExpConsultants => "EXP_CONSULTANTS",
            ExpTempLabour => "EXP_TEMP_LABOUR",
            ExpContractedSvc => "EXP_CONTRACTED_SVC",
            ExpOther => "EXP_OTHER",
            OcsOpenAccess => "OCS_OPEN_ACCESS",
            OcsProfMembership => "OCS_PROF_MEMBERSHIP",
            PhdOtherSupport => "PHD_OTHER_SUPPORT",
            SharedHeps => "SHARED_HEPS",
            TravelEntCater => "TRAVEL_ENT_CATER",
            TravelStaffConf => "TRAVEL_STAFF_CONF",
        }
    }

    pub const fn label(self) -> &'static str {
        use ExpenseType::*;
        match self {
            AdvPromo => "Advertising, Marketing and Promotional Expenses",
            ConsGoods => "Consumable Goods",
            ConsLibrary => "Library",
            DataSwServices => "Computer Software and Services (includes Research data)",
            EquipMajor => "Major assets and equipment (>$10,000) / infrastructure costs",
            EquipMinor => "Minor Assets and Equipment (Asset < $10,000) Non-Capitalised Equipment",
            EquipRental => "Rental and Hire",
            EquipRepairs => "Repairs and Maintenance",
            EquipUtilities => "Utilities and Services",
            ExpConsultants => "Consultants",
            ExpTempLabour => "Contracted and Temporary Labour",
            ExpContractedSvc => "Contracted Services (ex. ICA)",
            ExpOther => "Other expert services",
            OcsOpenAccess => "Open Access Fees",
            OcsProfMembership => "Professional memberships and subscriptions",
            PhdOtherSupport => "Other Student Support (includes PhD Stipends/grants)",
            SharedHeps => "Contributions to HEPS",
            TravelEntCater => "Entertainment and catering",
            TravelStaffConf => "Travel, Staff Development, and Conference Expense",
        }
    }

    pub fn belongs_to(self, category: CostCategory) -> bool {
        self.category() == category
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryItem {
    pub code: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseTypeItem {
    pub code: &'static str,
    pub label: &'static str,
    pub category_code: &'static str,
}

/// The published code table: every category, then every expense type
/// with its parent category code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseCatalog {
    pub categories: Vec<CategoryItem>,
    pub expense_types: Vec<ExpenseTypeItem>,
}

pub fn expense_catalog() -> ExpenseCatalog {
    ExpenseCatalog {
        categories: CostCategory::ALL
            .into_iter()
            .map(|c| CategoryItem {
                code: c.code(),
                label: c.label(),
            })
            .collect(),
        expense_types: ExpenseType::ALL
            .into_iter()
            .map(|e| ExpenseTypeItem {
                code: e.code(),
                label: e.label(),
                category_code: e.category().code(),
            })
            .collect(),
    }
}
