//! Fixed output schema and the rules that route record paths into it
//!
//! Cells are filled in three passes over a [`FlatRecord`]:
//!
//! 1. [`DIRECT_MAPPINGS`]: exact path to column, always written.
//! 2. [`BOOLEAN_RULES`] then [`HEURISTIC_RULES`]: substring rules over the
//!    lowercased path, first match wins, never overwriting a filled cell
//!    (affirmative booleans excepted).
//! 3. Schedule presence from `IRS990Schedule<X>` path segments.
//!
//! Anything left over can be kept as JSON in `AdditionalData`.

use super::record::{FlatRecord, PATH_SEPARATOR};
use crate::sink::TabularRow;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Output header, one entry per column
pub const HEADER: &[&str] = &[
    "FileName",
    "EIN",
    "OrganizationName",
    "TaxYear",
    "ReturnType",
    "TotalRevenue",
    "TotalExpenses",
    "NetAssets",
    "TotalAssets",
    "TotalLiabilities",
    "ProgramServiceRevenue",
    "InvestmentIncome",
    "Contributions",
    "Grants",
    "Salaries",
    "ProfessionalFees",
    "Occupancy",
    "OtherExpenses",
    "AddressLine1",
    "AddressLine2",
    "City",
    "State",
    "ZIPCode",
    "Country",
    "Phone",
    "Website",
    "Mission",
    "PrimaryExemptPurpose",
    "OfficerCompensation",
    "EmployeeCompensation",
    "IndependentContractorCompensation",
    "TotalCompensation",
    "BoardMembers",
    "Volunteers",
    "Employees",
    "TotalIndividuals",
    "PoliticalCampaignActivity",
    "LobbyingActivity",
    "ForeignActivities",
    "ForeignAddress",
    "ForeignIncome",
    "ForeignExpenses",
    "RelatedOrganizations",
    "Subsidiaries",
    "JointVentures",
    "Partnerships",
    "UnrelatedBusinessIncome",
    "UnrelatedBusinessExpenses",
    "NetUnrelatedBusinessIncome",
    "ExcessBenefitTransactions",
    "LoansToOfficers",
    "LoansFromOfficers",
    "BusinessTransactions",
    "GrantsToOrganizations",
    "GrantsToIndividuals",
    "TotalGrants",
    "AssetsBOY",
    "AssetsEOY",
    "LiabilitiesBOY",
    "LiabilitiesEOY",
    "NetAssetsBOY",
    "NetAssetsEOY",
    "CashBOY",
    "CashEOY",
    "InvestmentsBOY",
    "InvestmentsEOY",
    "LandBOY",
    "LandEOY",
    "BuildingsBOY",
    "BuildingsEOY",
    "EquipmentBOY",
    "EquipmentEOY",
    "OtherAssetsBOY",
    "OtherAssetsEOY",
    "AccountsPayableBOY",
    "AccountsPayableEOY",
    "GrantsPayableBOY",
    "GrantsPayableEOY",
    "OtherLiabilitiesBOY",
    "OtherLiabilitiesEOY",
    "MortgagesBOY",
    "MortgagesEOY",
    "NotesPayableBOY",
    "NotesPayableEOY",
    "BondsBOY",
    "BondsEOY",
    "OtherDebtBOY",
    "OtherDebtEOY",
    "TotalDebtBOY",
    "TotalDebtEOY",
    "RevenueFromGovernment",
    "RevenueFromContributions",
    "RevenueFromProgramServices",
    "RevenueFromInvestment",
    "RevenueFromOther",
    "ExpensesForProgramServices",
    "ExpensesForManagement",
    "ExpensesForFundraising",
    "NetIncome",
    "FilingDate",
    "TaxPeriodBegin",
    "TaxPeriodEnd",
    "FormVersion",
    "SoftwareID",
    "SoftwareVersion",
    "PreparerName",
    "PreparerFirm",
    "PreparerAddress",
    "PreparerPhone",
    "PreparerEmail",
    "SignatureDate",
    "SignatureName",
    "SignatureTitle",
    "AmendedReturn",
    "InitialReturn",
    "FinalReturn",
    "Terminated",
    "DisasterRelief",
    "ElectronicFiling",
    "PaperFiling",
    "ExtensionFiled",
    "ExtensionGranted",
    "ExtensionExpiration",
    "PublicInspection",
    "ScheduleA",
    "ScheduleB",
    "ScheduleC",
    "ScheduleD",
    "ScheduleE",
    "ScheduleF",
    "ScheduleG",
    "ScheduleH",
    "ScheduleI",
    "ScheduleJ",
    "ScheduleK",
    "ScheduleL",
    "ScheduleM",
    "ScheduleN",
    "ScheduleO",
    "ScheduleR",
    "AdditionalData",];

/// Exact record path to column name
pub const DIRECT_MAPPINGS: &[(&str, &str)] = &[
    // Header
    ("Return.ReturnHeader.Filer.EIN", "EIN"),
    ("Return.ReturnHeader.Filer.BusinessName.BusinessNameLine1Txt", "OrganizationName"),
    ("Return.ReturnHeader.TaxYr", "TaxYear"),
    ("Return.ReturnHeader.ReturnTypeCd", "ReturnType"),
    ("Return.ReturnHeader.Filer.USAddress.AddressLine1Txt", "AddressLine1"),
    ("Return.ReturnHeader.Filer.USAddress.AddressLine2Txt", "AddressLine2"),
    ("Return.ReturnHeader.Filer.USAddress.CityNm", "City"),
    ("Return.ReturnHeader.Filer.USAddress.StateAbbreviationCd", "State"),
    ("Return.ReturnHeader.Filer.USAddress.ZIPCd", "ZIPCode"),
    ("Return.ReturnHeader.Filer.ForeignAddress.AddressLine1Txt", "AddressLine1"),
    ("Return.ReturnHeader.Filer.ForeignAddress.CityNm", "City"),
    ("Return.ReturnHeader.Filer.ForeignAddress.CountryCd", "Country"),
    ("Return.ReturnHeader.Filer.PhoneNum", "Phone"),
    ("Return.ReturnHeader.ReturnTs", "FilingDate"),
    ("Return.ReturnHeader.TaxPeriodBeginDt", "TaxPeriodBegin"),
    ("Return.ReturnHeader.TaxPeriodEndDt", "TaxPeriodEnd"),
    ("Return.ReturnHeader.SoftwareId", "SoftwareID"),
    ("Return.ReturnHeader.SoftwareVersionNum", "SoftwareVersion"),
    ("Return.ReturnHeader.PreparerPersonGrp.PreparerPersonNm", "PreparerName"),
    ("Return.ReturnHeader.PreparerPersonGrp.PhoneNum", "PreparerPhone"),
    ("Return.ReturnHeader.PreparerFirmGrp.PreparerFirmName.BusinessNameLine1Txt", "PreparerFirm"),
    ("Return.ReturnHeader.PreparerFirmGrp.PreparerUSAddress.AddressLine1Txt", "PreparerAddress"),
    ("Return.ReturnHeader.BusinessOfficerGrp.PersonNm", "SignatureName"),
    ("Return.ReturnHeader.BusinessOfficerGrp.PersonTitleTxt", "SignatureTitle"),
    ("Return.ReturnHeader.BusinessOfficerGrp.SignatureDt", "SignatureDate"),
    // Form 990 summary
    ("Return.ReturnData.IRS990.CYTotalRevenueAmt", "TotalRevenue"),
    ("Return.ReturnData.IRS990.CYTotalExpensesAmt", "TotalExpenses"),
    ("Return.ReturnData.IRS990.CYRevenuesLessExpensesAmt", "NetIncome"),
    ("Return.ReturnData.IRS990.CYProgramServiceRevenueAmt", "ProgramServiceRevenue"),
    ("Return.ReturnData.IRS990.CYInvestmentIncomeAmt", "InvestmentIncome"),
    ("Return.ReturnData.IRS990.CYContributionsGrantsAmt", "Contributions"),
    ("Return.ReturnData.IRS990.CYGrantsAndSimilarPaidAmt", "Grants"),
    ("Return.ReturnData.IRS990.CYSalariesCompEmpBnftPaidAmt", "Salaries"),
    ("Return.ReturnData.IRS990.CYOtherExpensesAmt", "OtherExpenses"),
    ("Return.ReturnData.IRS990.TotalAssetsBOYAmt", "AssetsBOY"),
    ("Return.ReturnData.IRS990.TotalAssetsEOYAmt", "AssetsEOY"),
    ("Return.ReturnData.IRS990.TotalLiabilitiesBOYAmt", "LiabilitiesBOY"),
    ("Return.ReturnData.IRS990.TotalLiabilitiesEOYAmt", "LiabilitiesEOY"),
    ("Return.ReturnData.IRS990.NetAssetsOrFundBalancesBOYAmt", "NetAssetsBOY"),
    ("Return.ReturnData.IRS990.NetAssetsOrFundBalancesEOYAmt", "NetAssetsEOY"),
    ("Return.ReturnData.IRS990.MissionDesc", "Mission"),
    ("Return.ReturnData.IRS990.ActivityOrMissionDesc", "PrimaryExemptPurpose"),
    ("Return.ReturnData.IRS990.WebsiteAddressTxt", "Website"),
    ("Return.ReturnData.IRS990.VotingMembersGoverningBodyCnt", "BoardMembers"),
    ("Return.ReturnData.IRS990.TotalVolunteersCnt", "Volunteers"),
    ("Return.ReturnData.IRS990.TotalEmployeeCnt", "Employees"),
    ("Return.ReturnData.IRS990.TotalProgramServiceExpensesAmt", "ExpensesForProgramServices"),
    ("Return.ReturnData.IRS990.TotalGrossUBIAmt", "UnrelatedBusinessIncome"),
    ("Return.ReturnData.IRS990.NetUnrelatedBusTxblIncmAmt", "NetUnrelatedBusinessIncome"),
    // Form 990 parts IV and VIII to X
    ("Return.ReturnData.IRS990.PoliticalCampaignActyInd", "PoliticalCampaignActivity"),
    ("Return.ReturnData.IRS990.LobbyingActivitiesInd", "LobbyingActivity"),
    ("Return.ReturnData.IRS990.ForeignActivitiesInd", "ForeignActivities"),
    ("Return.ReturnData.IRS990.EngagedInExcessBenefitTransInd", "ExcessBenefitTransactions"),
    ("Return.ReturnData.IRS990.LoanOutstandingInd", "LoansToOfficers"),
    ("Return.ReturnData.IRS990.BusinessRlnWithOrgMemInd", "BusinessTransactions"),
    ("Return.ReturnData.IRS990.GrantsToOrganizationsInd", "GrantsToOrganizations"),
    ("Return.ReturnData.IRS990.GrantsToIndividualsInd", "GrantsToIndividuals"),
    ("Return.ReturnData.IRS990.GovernmentGrantsAmt", "RevenueFromGovernment"),
    ("Return.ReturnData.IRS990.TotalContributionsAmt", "RevenueFromContributions"),
    ("Return.ReturnData.IRS990.TotalProgramServiceRevenueAmt", "RevenueFromProgramServices"),
    ("Return.ReturnData.IRS990.InvestmentIncomeGrp.TotalRevenueColumnAmt", "RevenueFromInvestment"),
    ("Return.ReturnData.IRS990.TotalFunctionalExpensesGrp.ProgramServicesAmt", "ExpensesForProgramServices"),
    ("Return.ReturnData.IRS990.TotalFunctionalExpensesGrp.ManagementAndGeneralAmt", "ExpensesForManagement"),
    ("Return.ReturnData.IRS990.TotalFunctionalExpensesGrp.FundraisingAmt", "ExpensesForFundraising"),
    ("Return.ReturnData.IRS990.CompCurrentOfcrDirectorsGrp.TotalAmt", "OfficerCompensation"),
    ("Return.ReturnData.IRS990.OtherSalariesAndWagesGrp.TotalAmt", "EmployeeCompensation"),
    ("Return.ReturnData.IRS990.FeesForServicesProfFundraising.TotalAmt", "ProfessionalFees"),
    ("Return.ReturnData.IRS990.OccupancyGrp.TotalAmt", "Occupancy"),
    ("Return.ReturnData.IRS990.TotalAssetsGrp.BOYAmt", "AssetsBOY"),
    ("Return.ReturnData.IRS990.TotalAssetsGrp.EOYAmt", "TotalAssets"),
    ("Return.ReturnData.IRS990.TotalLiabilitiesGrp.BOYAmt", "LiabilitiesBOY"),
    ("Return.ReturnData.IRS990.TotalLiabilitiesGrp.EOYAmt", "TotalLiabilities"),
    ("Return.ReturnData.IRS990.CashNonInterestBearingGrp.BOYAmt", "CashBOY"),
    ("Return.ReturnData.IRS990.CashNonInterestBearingGrp.EOYAmt", "CashEOY"),
    ("Return.ReturnData.IRS990.InvestmentsPubTradedSecGrp.BOYAmt", "InvestmentsBOY"),
    ("Return.ReturnData.IRS990.InvestmentsPubTradedSecGrp.EOYAmt", "InvestmentsEOY"),
    ("Return.ReturnData.IRS990.OtherAssetsTotalGrp.BOYAmt", "OtherAssetsBOY"),
    ("Return.ReturnData.IRS990.OtherAssetsTotalGrp.EOYAmt", "OtherAssetsEOY"),
    ("Return.ReturnData.IRS990.AccountsPayableAccrExpnssGrp.BOYAmt", "AccountsPayableBOY"),
    ("Return.ReturnData.IRS990.AccountsPayableAccrExpnssGrp.EOYAmt", "AccountsPayableEOY"),
    ("Return.ReturnData.IRS990.GrantsPayableGrp.BOYAmt", "GrantsPayableBOY"),
    ("Return.ReturnData.IRS990.GrantsPayableGrp.EOYAmt", "GrantsPayableEOY"),
    ("Return.ReturnData.IRS990.TaxExemptBondLiabilitiesGrp.BOYAmt", "BondsBOY"),
    ("Return.ReturnData.IRS990.TaxExemptBondLiabilitiesGrp.EOYAmt", "BondsEOY"),
    ("Return.ReturnData.IRS990.MortgNotesPyblScrdInvstPropGrp.BOYAmt", "MortgagesBOY"),
    ("Return.ReturnData.IRS990.MortgNotesPyblScrdInvstPropGrp.EOYAmt", "MortgagesEOY"),
    ("Return.ReturnData.IRS990.UnsecuredNotesLoansPayableGrp.BOYAmt", "NotesPayableBOY"),
    ("Return.ReturnData.IRS990.UnsecuredNotesLoansPayableGrp.EOYAmt", "NotesPayableEOY"),
    ("Return.ReturnData.IRS990.OtherLiabilitiesGrp.BOYAmt", "OtherLiabilitiesBOY"),
    ("Return.ReturnData.IRS990.OtherLiabilitiesGrp.EOYAmt", "OtherLiabilitiesEOY"),
];

/// Substring rule over a lowercased record path
#[derive(Clone, Copy, Debug)]
pub struct PathRule {
    /// Target column
    pub column: &'static str,
    /// At least one must occur (empty means no constraint)
    pub any_of: &'static [&'static str],
    /// All must occur
    pub all_of: &'static [&'static str],
}

impl PathRule {
    const fn new(
        column: &'static str,
        any_of: &'static [&'static str],
        all_of: &'static [&'static str],
    ) -> Self {
        Self {
            column,
            any_of,
            all_of,
        }
    }

    /// Whether `lower_path` satisfies this rule
    pub fn matches(&self, lower_path: &str) -> bool {
        (self.any_of.is_empty() || self.any_of.iter().any(|s| lower_path.contains(s)))
            && self.all_of.iter().all(|s| lower_path.contains(s))
    }
}

const NET_ASSET: &[&str] = &["asset"];
const LIABILITY: &[&str] = &["liabilit"];
const REVENUE: &[&str] = &["revenue", "income"];
const EXPENSE: &[&str] = &["expense", "cost"];
const COMPENSATION: &[&str] = &["compensation", "salary"];

/// Fallback routing for paths without a direct mapping, most specific first
///
/// Only the first matching rule is considered; if its column is already
/// filled the value is left unassigned.
pub const HEURISTIC_RULES: &[PathRule] = &[
    PathRule::new("NetAssetsBOY", NET_ASSET, &["net", "amt", "boy"]),
    PathRule::new("NetAssetsEOY", NET_ASSET, &["net", "amt", "eoy"]),
    PathRule::new("NetAssets", NET_ASSET, &["net", "amt"]),
    PathRule::new("AssetsBOY", NET_ASSET, &["total", "amt", "boy"]),
    PathRule::new("AssetsEOY", NET_ASSET, &["total", "amt", "eoy"]),
    PathRule::new("TotalAssets", NET_ASSET, &["total", "amt"]),
    PathRule::new("LiabilitiesBOY", LIABILITY, &["total", "amt", "boy"]),
    PathRule::new("LiabilitiesEOY", LIABILITY, &["total", "amt", "eoy"]),
    PathRule::new("TotalLiabilities", LIABILITY, &["total", "amt"]),
    PathRule::new("TotalRevenue", REVENUE, &["total", "amt"]),
    PathRule::new("ProgramServiceRevenue", REVENUE, &["program", "amt"]),
    PathRule::new("InvestmentIncome", REVENUE, &["investment", "amt"]),
    PathRule::new("Contributions", REVENUE, &["contribution", "amt"]),
    PathRule::new("TotalExpenses", EXPENSE, &["total", "amt"]),
    PathRule::new("ExpensesForProgramServices", EXPENSE, &["program", "amt"]),
    PathRule::new("ExpensesForManagement", EXPENSE, &["management", "amt"]),
    PathRule::new("ExpensesForFundraising", EXPENSE, &["fundraising", "amt"]),
    PathRule::new("OfficerCompensation", COMPENSATION, &["officer", "amt"]),
    PathRule::new("EmployeeCompensation", COMPENSATION, &["employee", "amt"]),
    PathRule::new("TotalCompensation", COMPENSATION, &["total", "amt"]),
];

/// Yes/No columns keyed on path substrings
pub const BOOLEAN_RULES: &[PathRule] = &[
    PathRule::new("AmendedReturn", &["amended"], &[]),
    PathRule::new("InitialReturn", &["initial"], &[]),
    PathRule::new("FinalReturn", &["final"], &[]),
    PathRule::new("Terminated", &["terminated"], &[]),
    PathRule::new("ElectronicFiling", &["electronic"], &[]),
];

/// Leaf values treated as an affirmative flag
pub const TRUE_MARKERS: &[&str] = &["true", "1", "X"];

/// Leaf values treated as a negative flag
pub const FALSE_MARKERS: &[&str] = &["false", "0"];

/// Element name prefix marking an attached schedule
pub const SCHEDULE_PREFIX: &str = "IRS990Schedule";

/// Column holding the JSON of unassigned paths
pub const ADDITIONAL_DATA: &str = "AdditionalData";

static COLUMN_INDEX: LazyLock<HashMap<&'static str, usize>> =
    LazyLock::new(|| HEADER.iter().enumerate().map(|(i, c)| (*c, i)).collect());

static DIRECT_INDEX: LazyLock<HashMap<&'static str, usize>> = LazyLock::new(|| {
    DIRECT_MAPPINGS
        .iter()
        .filter_map(|(path, column)| column_index(column).map(|i| (*path, i)))
        .collect()
});

/// Position of `column` in [`HEADER`]
pub fn column_index(column: &str) -> Option<usize> {
    COLUMN_INDEX.get(column).copied()
}

/// Build the output row for one document
///
/// Multi-valued paths contribute their first value to the row; the record
/// keeps all of them.
pub fn build_row(record: &FlatRecord, file_name: &str, include_additional: bool) -> TabularRow {
    let mut row = vec![String::new(); HEADER.len()];
    if let Some(i) = column_index("FileName") {
        row[i] = file_name.to_string();
    }

    let mut assigned = vec![false; record.len()];

    for (n, (path, values)) in record.iter().enumerate() {
        if let (Some(&i), Some(value)) = (DIRECT_INDEX.get(path), values.first()) {
            row[i] = value.clone();
            assigned[n] = true;
        }
    }

    for (n, (path, values)) in record.iter().enumerate() {
        if assigned[n] {
            continue;
        }
        let Some(value) = values.first() else {
            continue;
        };
        let lower = path.to_lowercase();
        assigned[n] = apply_boolean(&mut row, &lower, value) || apply_heuristic(&mut row, &lower, value);
    }

    for (path, _) in record.iter() {
        mark_schedules(&mut row, path);
    }

    if include_additional {
        let leftover: serde_json::Map<String, serde_json::Value> = record
            .iter()
            .zip(&assigned)
            .filter(|(_, assigned)| !**assigned)
            .map(|((path, values), _)| (path.to_string(), serde_json::json!(values)))
            .collect();
        if let Some(i) = column_index(ADDITIONAL_DATA)
            && !leftover.is_empty()
        {
            row[i] = serde_json::Value::Object(leftover).to_string();
        }
    }

    row
}

fn apply_boolean(row: &mut [String], lower_path: &str, value: &str) -> bool {
    let flag = if TRUE_MARKERS.contains(&value) {
        true
    } else if FALSE_MARKERS.contains(&value) {
        false
    } else {
        return false;
    };

    let Some(rule) = BOOLEAN_RULES.iter().find(|r| r.matches(lower_path)) else {
        return false;
    };
    let Some(i) = column_index(rule.column) else {
        return false;
    };

    if flag {
        row[i] = "Yes".to_string();
    } else if row[i].is_empty() {
        row[i] = "No".to_string();
    }
    true
}

fn apply_heuristic(row: &mut [String], lower_path: &str, value: &str) -> bool {
    let Some(rule) = HEURISTIC_RULES.iter().find(|r| r.matches(lower_path)) else {
        return false;
    };
    match column_index(rule.column) {
        Some(i) if row[i].is_empty() => {
            row[i] = value.to_string();
            true
        }
        _ => false,
    }
}

fn mark_schedules(row: &mut [String], path: &str) {
    for segment in path.split(PATH_SEPARATOR) {
        if let Some(letter) = segment.strip_prefix(SCHEDULE_PREFIX)
            && let Some(i) = column_index(&format!("Schedule{}", letter))
        {
            row[i] = "Yes".to_string();
        }
    }
}
