//! Structural Registry
//!
//! Static maps from article number to enclosing chapter/section and article
//! title for each regulation, as published in the final texts. Lookups never
//! fail: unknown numbers yield empty structural fields.

use regnav_core::{SourceId, Structure};

/// Article-number interval mapped to its chapter and optional section
struct ChapterRange {
    from: u32,
    to: u32,
    chapter: &'static str,
    chapter_title: &'static str,
    section: Option<(&'static str, &'static str)>,
}

const fn range(
    from: u32,
    to: u32,
    chapter: &'static str,
    chapter_title: &'static str,
    section: Option<(&'static str, &'static str)>,
) -> ChapterRange {
    ChapterRange {
        from,
        to,
        chapter,
        chapter_title,
        section,
    }
}

const HIGH_RISK: &str = "High-Risk AI Systems";
const DATA_SUBJECT: &str = "Rights of the Data Subject";
const CONTROLLER: &str = "Controller and Processor";

const EU_AI_ACT_CHAPTERS: &[ChapterRange] = &[
    range(1, 4, "I", "General Provisions", None),
    range(5, 5, "II", "Prohibited AI Practices", None),
    range(6, 7, "III", HIGH_RISK, Some(("1", "Classification Rules for High-Risk AI Systems"))),
    range(8, 15, "III", HIGH_RISK, Some(("2", "Requirements for High-Risk AI Systems"))),
    range(16, 27, "III", HIGH_RISK, Some(("3", "Obligations of Providers and Deployers of High-Risk AI Systems"))),
    range(28, 39, "III", HIGH_RISK, Some(("4", "Notifying Authorities and Notified Bodies"))),
    range(40, 49, "III", HIGH_RISK, Some(("5", "Standards, Conformity Assessment, Certificates and Registration"))),
    range(50, 50, "IV", "Transparency Obligations for Certain AI Systems and GPAI Models", None),
    range(51, 56, "V", "General-Purpose AI Models", None),
    range(57, 63, "VI", "Measures in Support of Innovation: AI Regulatory Sandboxes", None),
    range(64, 70, "VII", "Governance", None),
    range(71, 71, "VIII", "EU Database for High-Risk AI Systems", None),
    range(72, 80, "IX", "Post-Market Monitoring, Information Sharing and Market Surveillance", None),
    range(81, 88, "X", "Liability and Penalties", None),
    range(89, 94, "XI", "Delegation of Power and Committee Procedure", None),
    range(95, 113, "XII", "Final Provisions", None),
];

const GDPR_CHAPTERS: &[ChapterRange] = &[
    range(1, 4, "I", "General Provisions", None),
    range(5, 11, "II", "Principles", None),
    range(12, 14, "III", DATA_SUBJECT, Some(("1", "Transparency and Modalities"))),
    range(15, 15, "III", DATA_SUBJECT, Some(("2", "Information and Access to Personal Data"))),
    range(16, 20, "III", DATA_SUBJECT, Some(("3", "Rectification and Erasure"))),
    range(21, 22, "III", DATA_SUBJECT, Some(("4", "Right to Object and Automated Individual Decision-Making"))),
    range(23, 23, "III", DATA_SUBJECT, Some(("5", "Restrictions"))),
    range(24, 32, "IV", CONTROLLER, Some(("1", "General Obligations"))),
    range(33, 34, "IV", CONTROLLER, Some(("2", "Security of Personal Data"))),
    range(35, 36, "IV", CONTROLLER, Some(("3", "Data Protection Impact Assessment and Prior Consultation"))),
    range(37, 39, "IV", CONTROLLER, Some(("4", "Data Protection Officer"))),
    range(40, 43, "IV", CONTROLLER, Some(("5", "Codes of Conduct and Certification"))),
    range(44, 49, "V", "Transfers of Personal Data to Third Countries or International Organisations", None),
    range(50, 59, "VI", "Independent Supervisory Authorities", None),
    range(60, 76, "VII", "Cooperation and Consistency", None),
    range(77, 84, "VIII", "Remedies, Liability and Penalties", None),
    range(85, 91, "IX", "Provisions Relating to Specific Processing Situations", None),
    range(92, 99, "X", "Delegated Acts and Implementing Acts", None),
];

const DORA_CHAPTERS: &[ChapterRange] = &[
    range(1, 4, "I", "General Provisions", None),
    range(5, 16, "II", "ICT Risk Management", None),
    range(17, 23, "III", "ICT-Related Incident Management, Classification and Reporting", None),
    range(24, 27, "IV", "Digital Operational Resilience Testing", None),
    range(28, 44, "V", "Managing of ICT Third-Party Risk", None),
    range(45, 56, "VI", "Information-Sharing Arrangements", None),
    range(57, 64, "VII", "Competent Authorities", None),
    range(65, 72, "VIII", "Delegated and Implementing Acts", None),
];

const EU_AI_ACT_TITLES: &[(u32, &str)] = &[
    (1, "Subject Matter"),
    (2, "Scope"),
    (3, "Definitions"),
    (4, "AI Literacy"),
    (5, "Prohibited AI Practices"),
    (6, "Classification Rules for High-Risk AI Systems"),
    (7, "Amendments to Annex III"),
    (8, "Compliance with Requirements"),
    (9, "Risk Management System"),
    (10, "Data and Data Governance"),
    (11, "Technical Documentation"),
    (12, "Record-Keeping and Logging"),
    (13, "Transparency and Provision of Information to Deployers"),
    (14, "Human Oversight"),
    (15, "Accuracy, Robustness and Cybersecurity"),
    (16, "Obligations of Providers of High-Risk AI Systems"),
    (17, "Quality Management System"),
    (18, "Documentation Keeping"),
    (19, "Automatically Generated Logs"),
    (20, "Corrective Actions and Duty of Information"),
    (21, "Cooperation with Competent Authorities"),
    (22, "Authorised Representatives of Providers"),
    (23, "Obligations of Importers"),
    (24, "Obligations of Distributors"),
    (25, "Responsibilities along the AI Value Chain"),
    (26, "Obligations of Deployers of High-Risk AI Systems"),
    (27, "Obligations of Fundamental Rights Impact Assessment"),
    (43, "Conformity Assessment"),
    (47, "EU Declaration of Conformity"),
    (49, "Registration"),
    (50, "Transparency Obligations for Certain AI Systems"),
    (51, "Classification of GPAI Models as GPAI Models with Systemic Risk"),
    (52, "Obligations for Providers of GPAI Models"),
    (53, "Obligations of Providers of GPAI Models with Systemic Risk"),
    (54, "Qualified Presumption for GPAI Models with Systemic Risk"),
    (55, "Obligations of Deployers of GPAI Models"),
    (56, "Codes of Practice"),
    (95, "Codes of Conduct for Voluntary Application"),
    (96, "Guidelines"),
    (113, "Entry into Force and Application"),
];

const GDPR_TITLES: &[(u32, &str)] = &[
    (1, "Subject-Matter and Objectives"),
    (2, "Material Scope"),
    (3, "Territorial Scope"),
    (4, "Definitions"),
    (5, "Principles Relating to Processing of Personal Data"),
    (6, "Lawfulness of Processing"),
    (7, "Conditions for Consent"),
    (9, "Processing of Special Categories of Personal Data"),
    (12, "Transparent Information, Communication and Modalities"),
    (13, "Information to Be Provided Where Personal Data Are Collected from the Data Subject"),
    (14, "Information to Be Provided Where Personal Data Have Not Been Obtained from the Data Subject"),
    (15, "Right of Access by the Data Subject"),
    (16, "Right to Rectification"),
    (17, "Right to Erasure ('Right to Be Forgotten')"),
    (18, "Right to Restriction of Processing"),
    (20, "Right to Data Portability"),
    (21, "Right to Object"),
    (22, "Automated Individual Decision-Making, Including Profiling"),
    (24, "Responsibility of the Controller"),
    (25, "Data Protection by Design and by Default"),
    (28, "Processor"),
    (30, "Records of Processing Activities"),
    (32, "Security of Processing"),
    (33, "Notification of a Personal Data Breach to the Supervisory Authority"),
    (34, "Communication of a Personal Data Breach to the Data Subject"),
    (35, "Data Protection Impact Assessment"),
    (36, "Prior Consultation"),
    (37, "Designation of the Data Protection Officer"),
    (44, "General Principle for Transfers"),
    (46, "Transfers Subject to Appropriate Safeguards"),
    (83, "General Conditions for Imposing Administrative Fines"),
];

const DORA_TITLES: &[(u32, &str)] = &[
    (1, "Subject Matter"),
    (2, "Scope"),
    (3, "Definitions"),
    (4, "Proportionality Principle"),
    (5, "ICT Risk Management Framework"),
    (6, "ICT Systems, Protocols and Tools"),
    (7, "ICT Systems and Tools Management Policies"),
    (8, "Identification"),
    (9, "Protection and Prevention"),
    (10, "Detection"),
    (11, "Response and Recovery"),
    (12, "Backup Policies and Recovery Procedures"),
    (13, "Learning and Evolving"),
    (14, "Communication"),
    (15, "Further Harmonisation of ICT Risk Management Tools, Methods, Processes and Policies"),
    (16, "Simplified ICT Risk Management Framework"),
    (17, "ICT-Related Incident Management Process"),
    (18, "Classification of ICT-Related Incidents and Cyber Threats"),
    (19, "Reporting of Major ICT-Related Incidents and Voluntary Notification"),
    (20, "Harmonisation of Reporting Content and Templates"),
    (21, "Centralised Reporting"),
    (24, "General Requirements for Digital Operational Resilience Testing"),
    (25, "Testing of ICT Tools and Systems"),
    (26, "Advanced Testing of ICT Tools, Systems and Processes Based on TLPT"),
    (28, "General Principles of Sound Management of ICT Third-Party Risk"),
    (30, "Key Contractual Provisions"),
    (31, "Preliminary Assessment of ICT Concentration Risk"),
    (32, "Framework for the Oversight of Critical ICT Third-Party Service Providers"),
    (45, "Information-Sharing Arrangements on Cyber Threat Information and Intelligence"),
];

/// Annex number of the EU AI Act list of high-risk use cases
pub const HIGH_RISK_ANNEX: &str = "III";

/// Title of the high-risk annex
pub const HIGH_RISK_ANNEX_TITLE: &str = "List of High-Risk AI Systems referred to in Article 6(2)";

const HIGH_RISK_POINT_TITLES: &[(u32, &str)] = &[
    (1, "Biometric Identification and Categorisation of Natural Persons"),
    (2, "Management and Operation of Critical Infrastructure"),
    (3, "Education and Vocational Training"),
    (4, "Employment, Workers Management and Access to Self-Employment"),
    (5, "Access to and Enjoyment of Essential Private Services and Essential Public Services and Benefits"),
    (6, "Law Enforcement"),
    (7, "Migration, Asylum and Border Control Management"),
    (8, "Administration of Justice and Democratic Processes"),
];

fn chapters(source: SourceId) -> &'static [ChapterRange] {
    match source {
        SourceId::EuAiAct => EU_AI_ACT_CHAPTERS,
        SourceId::Gdpr => GDPR_CHAPTERS,
        SourceId::Dora => DORA_CHAPTERS,
    }
}

fn titles(source: SourceId) -> &'static [(u32, &'static str)] {
    match source {
        SourceId::EuAiAct => EU_AI_ACT_TITLES,
        SourceId::Gdpr => GDPR_TITLES,
        SourceId::Dora => DORA_TITLES,
    }
}

/// Structure for a numbered article
pub fn lookup(source: SourceId, article: u32) -> Structure {
    let mut structure = Structure::default();

    if let Some(chapter) = chapters(source)
        .iter()
        .find(|c| (c.from..=c.to).contains(&article))
    {
        structure.chapter_number = chapter.chapter.to_string();
        structure.chapter_title = chapter.chapter_title.to_string();
        if let Some((number, title)) = chapter.section {
            structure.section_number = number.to_string();
            structure.section_title = title.to_string();
        }
    }

    if let Some(title) = article_title(source, article) {
        structure.article_title = title.to_string();
    }

    structure
}

/// Structure for an article label fragment such as "6" or "6a"
///
/// The leading digits select the article; anything unparsable yields an
/// empty structure.
pub fn lookup_label(source: SourceId, article: &str) -> Structure {
    let digits: String = article
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.parse::<u32>() {
        Ok(number) => lookup(source, number),
        Err(_) => Structure::default(),
    }
}

/// Known title of an article, if recorded
pub fn article_title(source: SourceId, article: u32) -> Option<&'static str> {
    titles(source)
        .iter()
        .find(|(number, _)| *number == article)
        .map(|(_, title)| *title)
}

/// Whether an annex gets point/sub-point treatment
pub fn is_high_risk_annex(source: SourceId, annex: &str) -> bool {
    source == SourceId::EuAiAct && annex.eq_ignore_ascii_case(HIGH_RISK_ANNEX)
}

/// Title of a numbered point of the high-risk annex
pub fn high_risk_point_title(point: u32) -> Option<&'static str> {
    HIGH_RISK_POINT_TITLES
        .iter()
        .find(|(number, _)| *number == point)
        .map(|(_, title)| *title)
}
