//! Prompt templates and response schemas.
//!
//! Taxonomy discovery has one fixed prompt. Category extraction looks the
//! category up in a static registry and falls back to a generic template for
//! labels the registry does not know.
//!
//! Experience and Personnel are kept apart in both directions: Experience is
//! the organisation's track record (past contracts, references, years in
//! business), Personnel is about named individuals or teams (CVs,
//! certifications, key roles). Each template tells the model to leave the
//! other category's material out.

use serde_json::{json, Value};

use crate::domain::Priority;

/// Curated focus for one requirement category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTemplate {
    pub name: &'static str,

    /// What belongs in the category
    pub focus: &'static str,

    /// What must be left to another category
    pub exclude: Option<&'static str>,
}

const REGISTRY: &[CategoryTemplate] = &[
    CategoryTemplate {
        name: "Financial",
        focus: "minimum turnover, revenue thresholds, audited financial statements, credit ratings, bank guarantees, bid bonds, performance bonds and any other proof of financial standing",
        exclude: None,
    },
    CategoryTemplate {
        name: "Experience",
        focus: "the bidding organisation's track record: similar contracts completed, project references, client testimonials, years in business and portfolio value",
        exclude: Some("qualifications of individual people or teams (those belong to Personnel)"),
    },
    CategoryTemplate {
        name: "Personnel",
        focus: "qualifications of individuals or teams: key roles, CVs, professional certifications, years of individual experience, staffing levels and team composition",
        exclude: Some("the organisation's own track record or past contracts (those belong to Experience)"),
    },
    CategoryTemplate {
        name: "Technical",
        focus: "technical capability the bidder must demonstrate: methodologies, tools, equipment, technical standards, and required technical proposals",
        exclude: None,
    },
    CategoryTemplate {
        name: "Compliance",
        focus: "regulatory compliance, mandatory declarations, registrations, licences, tax clearance and eligibility criteria",
        exclude: None,
    },
    CategoryTemplate {
        name: "Legal",
        focus: "legal standing, company registration, power of attorney, contractual terms the bidder must accept, disputes and exclusion grounds",
        exclude: None,
    },
    CategoryTemplate {
        name: "Operational",
        focus: "operational capacity: service levels, response times, delivery capacity, locations of operation and support arrangements",
        exclude: None,
    },
    CategoryTemplate {
        name: "Quality",
        focus: "quality management systems, ISO 9001 or equivalent certification, quality assurance plans and inspection procedures",
        exclude: None,
    },
    CategoryTemplate {
        name: "Environmental",
        focus: "environmental management, ISO 14001 or equivalent, environmental impact obligations and waste handling",
        exclude: None,
    },
    CategoryTemplate {
        name: "Safety",
        focus: "health and safety management, ISO 45001 or equivalent, safety records, incident rates and safety plans",
        exclude: None,
    },
    CategoryTemplate {
        name: "Insurance",
        focus: "required insurance cover: professional indemnity, public liability, employer's liability, amounts and evidence of cover",
        exclude: None,
    },
    CategoryTemplate {
        name: "Geographic",
        focus: "geographic constraints: local presence, offices, service areas and nationality or residency conditions",
        exclude: None,
    },
    CategoryTemplate {
        name: "Partnership",
        focus: "consortium, joint venture and subcontracting rules, partner eligibility and lead-partner obligations",
        exclude: None,
    },
    CategoryTemplate {
        name: "Security",
        focus: "information security, security clearances, data protection, ISO 27001 or equivalent and confidentiality obligations",
        exclude: None,
    },
    CategoryTemplate {
        name: "Infrastructure",
        focus: "facilities, equipment, hardware, hosting and physical infrastructure the bidder must own or provide",
        exclude: None,
    },
    CategoryTemplate {
        name: "Training",
        focus: "training obligations, knowledge transfer, training plans and trainer qualifications the bidder must offer",
        exclude: None,
    },
    CategoryTemplate {
        name: "Communication",
        focus: "language requirements, reporting lines, communication plans, meetings and points of contact",
        exclude: None,
    },
    CategoryTemplate {
        name: "Sustainability",
        focus: "sustainability commitments, social value, carbon reduction, ethical sourcing and diversity obligations",
        exclude: None,
    },
];

/// Registry entry for a category label (case-insensitive)
pub fn template_for(category: &str) -> Option<&'static CategoryTemplate> {
    let category = category.trim();
    REGISTRY
        .iter()
        .find(|t| t.name.eq_ignore_ascii_case(category))
}

/// Names of all curated categories
pub fn curated_categories() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|t| t.name)
}

pub fn taxonomy_prompt(corpus: &str) -> String {
    format!(
        r#"You are analysing tender and procurement documents to prepare a bid.

Identify the types of BID QUALIFICATION requirements in the documents below:
conditions a bidder must satisfy to be eligible or to score well (for example
Financial, Experience, Personnel, Technical, Compliance, Legal, Quality,
Insurance).

Do NOT list project deliverable categories. Work the winning bidder will
perform after award (features to build, services to deliver, milestones,
specifications of the delivered product) is not a qualification requirement.

Keep "Experience" (the organisation's track record) separate from
"Personnel" (qualifications of individuals or teams).

Return each requirement type once, as a short title-case label, in the
order they first appear in the documents.

DOCUMENTS:
{corpus}"#
    )
}

pub fn category_prompt(category: &str, corpus: &str) -> String {
    let category = category.trim();
    let focus = match template_for(category) {
        Some(template) => {
            let mut focus = format!(
                "Extract every {} requirement: {}.",
                template.name, template.focus
            );
            if let Some(exclude) = template.exclude {
                focus.push_str(&format!("\nDo NOT include {}.", exclude));
            }
            focus
        }
        None => format!("Extract everything related to {}.", category),
    };

    format!(
        r#"You are analysing tender and procurement documents to prepare a bid.

{focus}

Only extract bid qualification requirements, not project deliverables.
For each requirement give:
- type: "{category}"
- title: a short, specific name
- priority: one of {priorities}
- description: what the bidder must provide or demonstrate, citing figures
  and thresholds from the documents

Return an empty list if the documents contain no {category} requirements.

DOCUMENTS:
{corpus}"#,
        priorities = Priority::ALL
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    )
}

/// Schema for the taxonomy response
pub fn taxonomy_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "requirement_types": {
                "type": "array",
                "items": { "type": "string" }
            }
        },
        "required": ["requirement_types"]
    })
}

/// Schema for one category's requirement list
pub fn requirements_schema() -> Value {
    let priorities: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "requirements": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "title": { "type": "string" },
                        "priority": { "type": "string", "enum": priorities },
                        "description": { "type": "string" }
                    },
                    "required": ["type", "title", "priority", "description"]
                }
            }
        },
        "required": ["requirements"]
    })
}
