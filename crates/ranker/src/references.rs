//! Reference string to canonical source URL
//!
//! An ordered table evaluated first-match-wins. Several patterns overlap
//! (generic "... Press Release <date>" vs. the CPI/IIP releases, "Master
//! Direction" vs. drafts), so the order of [`RULES`] is significant.

use macrolens_common::errors::{AppError, Result};
use regex_lite::Regex;

/// Returned when no rule matches
pub const UNKNOWN_URL: &str = "Unknown Url";

const RBI_PRESS_RELEASES: &str = "https://rbi.org.in/Scripts/BS_PressReleaseDisplay.aspx";
const RBI_SPEECHES_VIEW: &str = "https://rbi.org.in/Scripts/BS_SpeechesView.aspx";
const MSME_UAM_PUBLICATION: &str = "https://www.dcmsme.gov.in/uampublication.aspx";

/// How a rule matches a reference
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Regular expression, anchored by the pattern itself
    Regex(&'static str),
    /// Plain substring anywhere in the reference
    Contains(&'static str),
}

/// One table row
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub pattern: Pattern,
    pub url: &'static str,
}

const fn re(pattern: &'static str, url: &'static str) -> Rule {
    Rule {
        pattern: Pattern::Regex(pattern),
        url,
    }
}

const fn contains(needle: &'static str, url: &'static str) -> Rule {
    Rule {
        pattern: Pattern::Contains(needle),
        url,
    }
}

/// Canonical reference table, in precedence order
pub const RULES: &[Rule] = &[
    // Surveys and monetary policy
    re(
        r"^Inflation Expectations Survey of Households \w+ \d{4}",
        "https://website.rbi.org.in/web/rbi/statistics/survey?category=24927098&categoryName=Inflation%20Expectations%20Survey%20of%20House-holds%20-%20Bi-monthly",
    ),
    re(
        r"^Monetary Policy Report \w+ \d{4}",
        "https://website.rbi.org.in/web/rbi/publications/articles?category=24927873",
    ),
    re(
        r"^Minutes of the Monetary Policy Committee Meeting \w+ \d{4}",
        "https://website.rbi.org.in/web/rbi/press-releases?q=%22Minutes+of+the+Monetary+Policy+Committee+Meeting%22",
    ),
    // Statistical releases
    re(
        r"^CPI Press Release \w+ \d{4}",
        "https://www.mospi.gov.in/archive/press-release?field_press_release_category_tid=120",
    ),
    re(
        r"^Economic Survey \d{4} ?- ?\d{4}",
        "https://www.indiabudget.gov.in/economicsurvey/allpes.php",
    ),
    re(
        r"^IIP Press Release \w+ \d{4}",
        "https://www.mospi.gov.in/archive/press-release?field_press_release_category_tid=121",
    ),
    re(
        r"^Monthly Economic Report \w+ \d{4}",
        "https://dea.gov.in/monthly-economic-report-table",
    ),
    // RBI publication families
    re(r"^RBI Bulletin \w+ \d{4}", "https://rbi.org.in/Scripts/BS_ViewBulletin.aspx"),
    re(
        r"^RBI State Finances \w+ \d{4}",
        "https://rbi.org.in/Scripts/AnnualPublications.aspx?head=State%20Finances%20:%20A%20Study%20of%20Budgets",
    ),
    re(
        r"^RBI Handbook of Statistics On Indian States \w+ \d{4}",
        "https://rbi.org.in/Scripts/AnnualPublications.aspx?head=Handbook+of+Statistics+on+Indian+States",
    ),
    re(
        r"^RBI Publications - Annual \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Annual",
    ),
    re(
        r"^RBI Publications - Half Yearly \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=HalfYearly",
    ),
    re(
        r"^RBI Publications - Monthly \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Monthly",
    ),
    contains(
        "Survey of Professional Forecasters on Macroeconomic Indicators",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=BiMonthly",
    ),
    re(
        r"^RBI Publications Biennial \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Biennial",
    ),
    re(
        r"^Sources of Variation in India’s Foreign Exchange Reserves RBI Publications - Quaterly \w+ \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Quarterly",
    ),
    re(
        r"^.+ - RBI Notifications \w+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/NotificationUser.aspx",
    ),
    re(
        r"^RBI - Occasional Papers - Vol\. \d{2}, No\. ?\d(?:,|:)? ?[A-Za-z]+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/HalfYearlyPublications.aspx?head=Occasional+Papers",
    ),
    re(
        r"^RBI WPS \(DEPR\): \d{2}/\d{4}: .+",
        "https://rbi.org.in/Scripts/PublicationsView.aspx?head=Working%20Papers",
    ),
    re(
        r"^Measuring Productivity at the Industry Level – The India KLEMS Database \w+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/KLEMS.aspx",
    ),
    re(
        r"^RBI Publications - Weekly \d{1,2} \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Weekly",
    ),
    re(
        r"^RBI Publications - Reports .+ \d{1,2} \w+ \d{4}",
        "https://rbi.org.in/Scripts/Publications.aspx?publication=Reports",
    ),
    re(r"^RBI Speeches - .+", "https://rbi.org.in/Scripts/BS_ViewSpeeches.aspx"),
    re(
        r"^DRG Study No\. \d{1,3}: .+ \w+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/Occas_DRG_Studies.aspx",
    ),
    // Press releases and banking statistics
    re(r"^.+ Press Release \w+ \d{1,2}, \d{4}", RBI_PRESS_RELEASES),
    re(
        r"^Lending and Deposit Rates of Scheduled Commercial Banks – \w+ \d{4}",
        RBI_PRESS_RELEASES,
    ),
    re(
        r"^Monthly Data on India’s International Trade in Services.+",
        RBI_PRESS_RELEASES,
    ),
    re(
        r"^Scheduled Banks’ Statement of Position in India as on .+",
        RBI_PRESS_RELEASES,
    ),
    re(r"^Sectoral Deployment of Bank Credit – \w+ \d{4}", RBI_PRESS_RELEASES),
    // Legislation
    re(
        r"^(THE\s+)?[A-Z][A-Za-z ’()-]+(Act|Code), \d{4}",
        "https://rbi.org.in/Scripts/Act.aspx",
    ),
    re(r"^.+Act, \d{4}", "https://rbi.org.in/Scripts/Act.aspx"),
    re(r"^.*Scheme, \d{4}$", "https://rbi.org.in/Scripts/Schemes.aspx"),
    re(r"^.*Regulations, \d{4}$", "https://rbi.org.in/Scripts/Regulations.aspx"),
    re(r"^.*Rules, \d{4}$", "https://rbi.org.in/Scripts/Rules.aspx"),
    // Governor's press conferences, interviews, fireside chats
    re(
        r"(?i)^(Edited\s+)?Transcript of the Reserve Bank of India’s Post-Monetary Policy Press Conference: \w+ \d{1,2}, \d{4}",
        RBI_SPEECHES_VIEW,
    ),
    re(
        r"(?i)^Edited transcript of Reserve Bank of India’s Governor Press Conference with Media: \w+ \d{1,2}, \d{4}",
        RBI_SPEECHES_VIEW,
    ),
    re(
        r"(?i)^(Fireside chat|Panel Discussion) with Governor.*on \w+ \d{1,2}, \d{4}",
        RBI_SPEECHES_VIEW,
    ),
    re(r"(?i)^Interview of Governor.*on \w+ \d{1,2}, \d{4}", RBI_SPEECHES_VIEW),
    // Regulatory instructions
    re(
        r"(?i)^Master Direction(s)?( –| -)? .+",
        "https://rbi.org.in/Scripts/BS_ViewMasterDirections.aspx",
    ),
    re(
        r"^.*(Draft|draft|DRAFT).*(Circular|Direction|Guideline|Framework|Regulation|Instruction).* \w+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/DraftNotificationsGuildelines.aspx",
    ),
    re(
        r"(?i)^Master Circular(s)?( –|-)? (on )?.+ \w+ \d{1,2}, \d{4}",
        "https://rbi.org.in/Scripts/BS_ViewMasterCirculardetails.aspx",
    ),
    // Government of India and MSME sources
    re(
        r"(?i)^.+ -? ?PIB \d{1,2} \w+ \d{4}",
        "https://pib.gov.in/PressReleseDetail.aspx?PRID=2089308&reg=3&lang=1",
    ),
    re(
        r"(?i)^MSME ANNUAL REPORT( \d{4}-\d{2})?$",
        "https://www.msme.gov.in/relatedlinks/annual-report-ministry-micro-small-and-medium-enterprises",
    ),
    re(
        r"^Ministry Wise Procurement \d{4}-\d{2}",
        "https://sambandh.msme.gov.in/MinistryWisesReport.aspx",
    ),
    re(
        r"^RBI Report On Trend And Progress Of Banking In India \d{4}-\d{2}",
        "https://www.rbi.org.in/Scripts/AnnualPublications.aspx?head=Trend+and+Progress+of+Banking+in+India",
    ),
    re(
        r"(?i)^\d+-Year GST Statistical Report",
        "https://tutorial.gst.gov.in/offlineutilities/gst_statistics/6YearReport.pdf",
    ),
    re(
        r"(?i)^India Budget \d{4}-\d{4}",
        "https://www.indiabudget.gov.in/doc/Budget_Speech.pdf",
    ),
    re(r"(?i)^Udyog Aadhar Registeration \d{4}-\d{4}", MSME_UAM_PUBLICATION),
    re(r"(?i)^Udyog Aadhar Registeration \w+ \d{4}", MSME_UAM_PUBLICATION),
    // World Bank SME studies
    re(
        r"(?i)^MALAYSIA DEVELOPMENT EXPERIENCE SME \w+ \d{4}",
        "https://documents1.worldbank.org/curated/en/504361583989615623/pdf/Malaysia-s-Experience-with-the-Small-and-Medium-Sized-Enterprises-Masterplan-Lessons-Learned.pdf",
    ),
    re(
        r"(?i)^Malaysian SME Program Efficiency Review \w+ \d{4}",
        "https://documents1.worldbank.org/curated/en/099255003152238688/pdf/P17014606709a70f50856d0799328fb7040.pdf",
    ),
];

enum Matcher {
    Regex(Regex),
    Contains(&'static str),
}

impl Matcher {
    fn is_match(&self, reference: &str) -> bool {
        match self {
            Matcher::Regex(regex) => regex.is_match(reference),
            Matcher::Contains(needle) => reference.contains(needle),
        }
    }
}

/// Compiled reference table
pub struct ReferenceTable {
    rules: Vec<(Matcher, &'static str)>,
}

impl ReferenceTable {
    /// Compile [`RULES`]
    pub fn standard() -> Result<Self> {
        Self::compile(RULES)
    }

    pub fn compile(rules: &[Rule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let matcher = match rule.pattern {
                    Pattern::Regex(pattern) => Matcher::Regex(Regex::new(pattern).map_err(|e| {
                        AppError::Configuration {
                            message: format!("Invalid reference pattern '{}': {}", pattern, e),
                        }
                    })?),
                    Pattern::Contains(needle) => Matcher::Contains(needle),
                };
                Ok((matcher, rule.url))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// URL of the first matching rule, [`UNKNOWN_URL`] otherwise
    pub fn resolve(&self, reference: &str) -> &'static str {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.is_match(reference))
            .map(|(_, url)| *url)
            .unwrap_or(UNKNOWN_URL)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ReferenceTable {
        ReferenceTable::standard().unwrap()
    }

    #[test]
    fn test_every_rule_compiles() {
        assert_eq!(table().len(), RULES.len());
    }

    #[test]
    fn test_cpi_press_release() {
        assert_eq!(
            table().resolve("CPI Press Release March 2024"),
            "https://www.mospi.gov.in/archive/press-release?field_press_release_category_tid=120"
        );
        assert_eq!(
            table().resolve("IIP Press Release March 2024"),
            "https://www.mospi.gov.in/archive/press-release?field_press_release_category_tid=121"
        );
    }

    #[test]
    fn test_unknown_reference() {
        assert_eq!(table().resolve("Quarterly Weather Digest"), UNKNOWN_URL);
        assert_eq!(table().resolve(""), UNKNOWN_URL);
        // Prefix semantics: a known title in the middle does not match
        assert_eq!(table().resolve("Summary of CPI Press Release March 2024"), UNKNOWN_URL);
    }

    #[test]
    fn test_generic_press_release_needs_a_day() {
        let table = table();
        assert_eq!(
            table.resolve("Monetary Policy Statement Press Release June 6, 2024"),
            RBI_PRESS_RELEASES
        );
        assert_ne!(table.resolve("CPI Press Release June 2024"), RBI_PRESS_RELEASES);
    }

    #[test]
    fn test_master_direction_precedes_draft_rule() {
        let table = table();
        assert_eq!(
            table.resolve("Master Direction – Draft Guidelines on Lending June 5, 2024"),
            "https://rbi.org.in/Scripts/BS_ViewMasterDirections.aspx"
        );
        assert_eq!(
            table.resolve("Draft Master Direction on Interest Rates June 5, 2024"),
            "https://rbi.org.in/Scripts/DraftNotificationsGuildelines.aspx"
        );
    }

    #[test]
    fn test_legislation_rules() {
        let table = table();
        assert_eq!(
            table.resolve("Foreign Exchange Management Act, 1999"),
            "https://rbi.org.in/Scripts/Act.aspx"
        );
        assert_eq!(
            table.resolve("Payment and Settlement Systems Regulations, 2008"),
            "https://rbi.org.in/Scripts/Regulations.aspx"
        );
        assert_eq!(
            table.resolve("Reserve Bank - Integrated Ombudsman Scheme, 2021"),
            "https://rbi.org.in/Scripts/Schemes.aspx"
        );
    }

    #[test]
    fn test_contains_rule() {
        assert_eq!(
            table().resolve("Results of the Survey of Professional Forecasters on Macroeconomic Indicators – Round 89"),
            "https://rbi.org.in/Scripts/Publications.aspx?publication=BiMonthly"
        );
    }

    #[test]
    fn test_case_insensitive_rules() {
        let table = table();
        assert_eq!(
            table.resolve("msme annual report 2023-24"),
            "https://www.msme.gov.in/relatedlinks/annual-report-ministry-micro-small-and-medium-enterprises"
        );
        assert_eq!(
            table.resolve("INTERVIEW OF GOVERNOR with CNBC on March 12, 2024"),
            RBI_SPEECHES_VIEW
        );
        // Case-sensitive rules stay case-sensitive
        assert_eq!(table.resolve("cpi press release March 2024"), UNKNOWN_URL);
    }

    #[test]
    fn test_first_match_wins_on_custom_table() {
        let table = ReferenceTable::compile(&[
            re(r"^Report", "https://first.example"),
            re(r"^Report \d{4}", "https://second.example"),
        ])
        .unwrap();
        assert_eq!(table.resolve("Report 2024"), "https://first.example");
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        assert!(matches!(
            ReferenceTable::compile(&[re(r"^(unclosed", "https://x.example")]),
            Err(AppError::Configuration { .. })
        ));
    }
}
