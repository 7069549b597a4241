use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyRef {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
}

/// Someone (or some group) attending a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Party {
    Student(PartyRef),
    Staff(PartyRef),
    SubjectGroup(PartyRef),
    YearGroup(PartyRef),
    ContactGroup(PartyRef),
}

impl Party {
    fn inner(&self) -> &PartyRef {
        match self {
            Party::Student(p)
            | Party::Staff(p)
            | Party::SubjectGroup(p)
            | Party::YearGroup(p)
            | Party::ContactGroup(p) => p,
        }
    }

    pub fn id(&self) -> &str {
        &self.inner().id
    }

    /// Staff id when this attendee is a member of staff.
    pub fn staff_id(&self) -> Option<&str> {
        match self {
            Party::Staff(p) => Some(&p.id),
            Party::Student(_) | Party::SubjectGroup(_) | Party::YearGroup(_) | Party::ContactGroup(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_is_tagged_by_type() {
        let p: Party = serde_json::from_value(json!({
            "type": "subjectGroup",
            "id": "10A-MATHS",
            "displayName": "10A Maths"
        }))
        .expect("party");
        assert!(matches!(&p, Party::SubjectGroup(r) if r.display_name == "10A Maths"));
        assert_eq!(p.id(), "10A-MATHS");
        assert_eq!(p.staff_id(), None);

        let staff = Party::Staff(PartyRef {
            id: "s2".to_string(),
            display_name: String::new(),
        });
        assert_eq!(serde_json::to_value(&staff).expect("json")["type"], "staff");
        assert_eq!(staff.staff_id(), Some("s2"));
    }
}
