//! Built-in FHIR field-type graph
//!
//! A compact R4 subset: the resources and data types clinical
//! de-identification rules usually address. It drives type assignment when
//! JSON is loaded into a record tree, and schema validation of rules.
//!
//! Element definitions use a terse notation: `Type*` is a repeating element,
//! `a|b` lists the types of a choice element (`value[x]`).

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

type TypeTable = &'static [(&'static str, &'static [(&'static str, &'static str)])];

/// Fields every resource carries
const RESOURCE_FIELDS: &[(&str, &str)] = &[
    ("id", "id"),
    ("meta", "Meta"),
    ("implicitRules", "uri"),
    ("language", "code"),
    ("text", "Narrative"),
    ("contained", "Resource*"),
    ("extension", "Extension*"),
    ("modifierExtension", "Extension*"),
];

/// Fields every data type carries
const ELEMENT_FIELDS: &[(&str, &str)] = &[("id", "string"), ("extension", "Extension*")];

const OBSERVATION_VALUE: &str =
    "Quantity|CodeableConcept|string|boolean|integer|Range|Ratio|time|dateTime|Period";

const RESOURCES: TypeTable = &[
    (
        "Patient",
        &[
            ("identifier", "Identifier*"),
            ("active", "boolean"),
            ("name", "HumanName*"),
            ("telecom", "ContactPoint*"),
            ("gender", "code"),
            ("birthDate", "date"),
            ("deceased[x]", "boolean|dateTime"),
            ("address", "Address*"),
            ("maritalStatus", "CodeableConcept"),
            ("multipleBirth[x]", "boolean|integer"),
            ("photo", "Attachment*"),
            ("contact", "Patient.contact*"),
            ("communication", "Patient.communication*"),
            ("generalPractitioner", "Reference*"),
            ("managingOrganization", "Reference"),
            ("link", "Patient.link*"),
        ],
    ),
    (
        "Practitioner",
        &[
            ("identifier", "Identifier*"),
            ("active", "boolean"),
            ("name", "HumanName*"),
            ("telecom", "ContactPoint*"),
            ("address", "Address*"),
            ("gender", "code"),
            ("birthDate", "date"),
            ("qualification", "Practitioner.qualification*"),
        ],
    ),
    (
        "Organization",
        &[
            ("identifier", "Identifier*"),
            ("active", "boolean"),
            ("type", "CodeableConcept*"),
            ("name", "string"),
            ("alias", "string*"),
            ("telecom", "ContactPoint*"),
            ("address", "Address*"),
            ("partOf", "Reference"),
        ],
    ),
    (
        "Observation",
        &[
            ("identifier", "Identifier*"),
            ("basedOn", "Reference*"),
            ("status", "code"),
            ("category", "CodeableConcept*"),
            ("code", "CodeableConcept"),
            ("subject", "Reference"),
            ("encounter", "Reference"),
            ("effective[x]", "dateTime|Period|instant"),
            ("issued", "instant"),
            ("performer", "Reference*"),
            ("value[x]", OBSERVATION_VALUE),
            ("interpretation", "CodeableConcept*"),
            ("note", "Annotation*"),
            ("bodySite", "CodeableConcept"),
            ("method", "CodeableConcept"),
            ("referenceRange", "Observation.referenceRange*"),
            ("component", "Observation.component*"),
        ],
    ),
    (
        "Encounter",
        &[
            ("identifier", "Identifier*"),
            ("status", "code"),
            ("class", "Coding"),
            ("type", "CodeableConcept*"),
            ("subject", "Reference"),
            ("participant", "Encounter.participant*"),
            ("period", "Period"),
            ("length", "Duration"),
            ("reasonCode", "CodeableConcept*"),
            ("location", "Encounter.location*"),
            ("serviceProvider", "Reference"),
        ],
    ),
    (
        "Condition",
        &[
            ("identifier", "Identifier*"),
            ("clinicalStatus", "CodeableConcept"),
            ("verificationStatus", "CodeableConcept"),
            ("category", "CodeableConcept*"),
            ("severity", "CodeableConcept"),
            ("code", "CodeableConcept"),
            ("bodySite", "CodeableConcept*"),
            ("subject", "Reference"),
            ("encounter", "Reference"),
            ("onset[x]", "dateTime|Age|Period|Range|string"),
            ("abatement[x]", "dateTime|Age|Period|Range|string"),
            ("recordedDate", "dateTime"),
            ("recorder", "Reference"),
            ("asserter", "Reference"),
            ("note", "Annotation*"),
        ],
    ),
    (
        "Bundle",
        &[
            ("identifier", "Identifier"),
            ("type", "code"),
            ("timestamp", "instant"),
            ("total", "unsignedInt"),
            ("link", "Bundle.link*"),
            ("entry", "Bundle.entry*"),
        ],
    ),
];

const BACKBONES: TypeTable = &[
    (
        "Patient.contact",
        &[
            ("relationship", "CodeableConcept*"),
            ("name", "HumanName"),
            ("telecom", "ContactPoint*"),
            ("address", "Address"),
            ("gender", "code"),
            ("organization", "Reference"),
            ("period", "Period"),
        ],
    ),
    (
        "Patient.communication",
        &[("language", "CodeableConcept"), ("preferred", "boolean")],
    ),
    ("Patient.link", &[("other", "Reference"), ("type", "code")]),
    (
        "Practitioner.qualification",
        &[
            ("identifier", "Identifier*"),
            ("code", "CodeableConcept"),
            ("period", "Period"),
            ("issuer", "Reference"),
        ],
    ),
    (
        "Observation.referenceRange",
        &[
            ("low", "SimpleQuantity"),
            ("high", "SimpleQuantity"),
            ("type", "CodeableConcept"),
            ("age", "Range"),
            ("text", "string"),
        ],
    ),
    (
        "Observation.component",
        &[
            ("code", "CodeableConcept"),
            ("value[x]", OBSERVATION_VALUE),
            ("interpretation", "CodeableConcept*"),
        ],
    ),
    (
        "Encounter.participant",
        &[
            ("type", "CodeableConcept*"),
            ("period", "Period"),
            ("individual", "Reference"),
        ],
    ),
    (
        "Encounter.location",
        &[
            ("location", "Reference"),
            ("status", "code"),
            ("period", "Period"),
        ],
    ),
    ("Bundle.link", &[("relation", "string"), ("url", "uri")]),
    (
        "Bundle.entry",
        &[
            ("fullUrl", "uri"),
            ("resource", "Resource"),
            ("search", "Bundle.entry.search"),
            ("request", "Bundle.entry.request"),
        ],
    ),
    (
        "Bundle.entry.search",
        &[("mode", "code"), ("score", "decimal")],
    ),
    (
        "Bundle.entry.request",
        &[("method", "code"), ("url", "uri")],
    ),
];

const QUANTITY_FIELDS: &[(&str, &str)] = &[
    ("value", "decimal"),
    ("comparator", "code"),
    ("unit", "string"),
    ("system", "uri"),
    ("code", "code"),
];

const DATA_TYPES: TypeTable = &[
    (
        "Meta",
        &[
            ("versionId", "id"),
            ("lastUpdated", "instant"),
            ("source", "uri"),
            ("profile", "canonical*"),
            ("security", "Coding*"),
            ("tag", "Coding*"),
        ],
    ),
    (
        "Identifier",
        &[
            ("use", "code"),
            ("type", "CodeableConcept"),
            ("system", "uri"),
            ("value", "string"),
            ("period", "Period"),
            ("assigner", "Reference"),
        ],
    ),
    (
        "HumanName",
        &[
            ("use", "code"),
            ("text", "string"),
            ("family", "string"),
            ("given", "string*"),
            ("prefix", "string*"),
            ("suffix", "string*"),
            ("period", "Period"),
        ],
    ),
    (
        "ContactPoint",
        &[
            ("system", "code"),
            ("value", "string"),
            ("use", "code"),
            ("rank", "positiveInt"),
            ("period", "Period"),
        ],
    ),
    (
        "Address",
        &[
            ("use", "code"),
            ("type", "code"),
            ("text", "string"),
            ("line", "string*"),
            ("city", "string"),
            ("district", "string"),
            ("state", "string"),
            ("postalCode", "postalCode"),
            ("country", "string"),
            ("period", "Period"),
        ],
    ),
    ("Period", &[("start", "dateTime"), ("end", "dateTime")]),
    (
        "Reference",
        &[
            ("reference", "string"),
            ("type", "uri"),
            ("identifier", "Identifier"),
            ("display", "string"),
        ],
    ),
    (
        "CodeableConcept",
        &[("coding", "Coding*"), ("text", "string")],
    ),
    (
        "Coding",
        &[
            ("system", "uri"),
            ("version", "string"),
            ("code", "code"),
            ("display", "string"),
            ("userSelected", "boolean"),
        ],
    ),
    ("Quantity", QUANTITY_FIELDS),
    ("SimpleQuantity", QUANTITY_FIELDS),
    ("Age", QUANTITY_FIELDS),
    ("Count", QUANTITY_FIELDS),
    ("Distance", QUANTITY_FIELDS),
    ("Duration", QUANTITY_FIELDS),
    ("Money", &[("value", "decimal"), ("currency", "code")]),
    ("Range", &[("low", "SimpleQuantity"), ("high", "SimpleQuantity")]),
    ("Ratio", &[("numerator", "Quantity"), ("denominator", "Quantity")]),
    ("Narrative", &[("status", "code"), ("div", "xhtml")]),
    (
        "Extension",
        &[
            ("url", "uri"),
            (
                "value[x]",
                "string|boolean|integer|decimal|date|dateTime|code|uri|Coding|CodeableConcept|Reference|Quantity|Period|Identifier|Address",
            ),
        ],
    ),
    (
        "Attachment",
        &[
            ("contentType", "code"),
            ("language", "code"),
            ("data", "base64Binary"),
            ("url", "url"),
            ("size", "unsignedInt"),
            ("hash", "base64Binary"),
            ("title", "string"),
            ("creation", "dateTime"),
        ],
    ),
    (
        "Annotation",
        &[
            ("author[x]", "Reference|string"),
            ("time", "dateTime"),
            ("text", "markdown"),
        ],
    ),
];

/// FHIR primitive type names, plus the `postalCode` marker type
pub const PRIMITIVE_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "integer64",
    "markdown",
    "oid",
    "positiveInt",
    "postalCode",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
    "xhtml",
];

/// Definition of one element of a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDef {
    /// Allowed types; more than one only for choice elements
    pub types: Vec<String>,
    pub is_array: bool,
    pub is_choice: bool,
}

/// Element resolved against a concrete JSON key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedElement {
    /// Concrete type, known unless a bare choice base was named
    pub type_name: Option<String>,
    /// All candidate types
    pub types: Vec<String>,
    /// Base name when the key selected a choice type (`value` for `valueQuantity`)
    pub alias: Option<String>,
    pub is_array: bool,
}

/// Field-type graph for FHIR resources and data types
#[derive(Debug)]
pub struct FhirSchema {
    types: HashMap<String, HashMap<String, ElementDef>>,
    resources: HashSet<String>,
}

impl FhirSchema {
    /// The built-in R4 subset
    pub fn r4() -> &'static FhirSchema {
        static SCHEMA: OnceLock<FhirSchema> = OnceLock::new();
        SCHEMA.get_or_init(Self::build)
    }

    fn build() -> Self {
        let mut types = HashMap::new();
        let mut resources = HashSet::new();

        for (name, fields) in RESOURCES {
            resources.insert(name.to_string());
            types.insert(name.to_string(), table(RESOURCE_FIELDS.iter().chain(fields.iter())));
        }
        for (name, fields) in BACKBONES.iter().chain(DATA_TYPES.iter()) {
            types.insert(name.to_string(), table(ELEMENT_FIELDS.iter().chain(fields.iter())));
        }
        types.insert("Resource".to_string(), table(RESOURCE_FIELDS.iter()));

        Self { types, resources }
    }

    /// True for resource types, including the abstract `Resource`
    pub fn is_resource(&self, name: &str) -> bool {
        name == "Resource" || self.resources.contains(name)
    }

    /// True when the name is a known primitive or complex type
    pub fn has_type(&self, name: &str) -> bool {
        PRIMITIVE_TYPES.contains(&name) || self.types.contains_key(name)
    }

    pub fn is_primitive(&self, name: &str) -> bool {
        PRIMITIVE_TYPES.contains(&name)
    }

    /// Element definitions of a complex type
    pub fn elements(&self, type_name: &str) -> Option<&HashMap<String, ElementDef>> {
        self.types.get(type_name)
    }

    /// Resolves a JSON key of `parent_type`, handling choice suffixes
    ///
    /// `deceasedDateTime` resolves to type `dateTime` with alias `deceased`;
    /// the bare base `deceased` resolves with all candidate types and no
    /// concrete type.
    pub fn element(&self, parent_type: &str, key: &str) -> Option<ResolvedElement> {
        let fields = self.types.get(parent_type)?;

        if let Some(def) = fields.get(key) {
            return Some(ResolvedElement {
                type_name: (def.types.len() == 1).then(|| def.types[0].clone()),
                types: def.types.clone(),
                alias: None,
                is_array: def.is_array,
            });
        }

        fields
            .iter()
            .filter(|(_, def)| def.is_choice)
            .find_map(|(base, def)| {
                let suffix = key.strip_prefix(base.as_str())?;
                let chosen = def.types.iter().find(|t| choice_suffix(t) == suffix)?;
                Some(ResolvedElement {
                    type_name: Some(chosen.clone()),
                    types: vec![chosen.clone()],
                    alias: Some(base.clone()),
                    is_array: def.is_array,
                })
            })
    }

    /// Resolves a dotted path starting at a resource type to its terminal types
    pub fn resolve_path(&self, segments: &[&str]) -> Result<Vec<String>, String> {
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| "empty path".to_string())?;
        if !self.types.contains_key(*first) {
            return Err(format!("unknown resource type '{first}'"));
        }

        let mut current = vec![first.to_string()];
        for segment in rest {
            let mut next = Vec::new();
            for type_name in &current {
                if self.is_primitive(type_name) {
                    continue;
                }
                if let Some(element) = self.element(type_name, segment) {
                    next.extend(element.types);
                }
            }
            if next.is_empty() {
                return Err(format!(
                    "unknown field '{}' on {}",
                    segment,
                    current.join("|")
                ));
            }
            next.dedup();
            current = next;
        }
        Ok(current)
    }
}

fn table<'a>(
    fields: impl Iterator<Item = &'a (&'static str, &'static str)>,
) -> HashMap<String, ElementDef> {
    fields
        .map(|(name, spec)| {
            let is_array = spec.ends_with('*');
            let spec = spec.trim_end_matches('*');
            let is_choice = name.ends_with("[x]");
            let name = name.trim_end_matches("[x]").to_string();
            let types = spec.split('|').map(str::to_string).collect();
            (
                name,
                ElementDef {
                    types,
                    is_array,
                    is_choice,
                },
            )
        })
        .collect()
}

/// Upper-camel suffix a choice type contributes to a JSON key
fn choice_suffix(type_name: &str) -> String {
    let mut chars = type_name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}
