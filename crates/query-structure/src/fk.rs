use crate::relation_info::RelationInfo;

/// The planner's view of foreign-key direction for one relation (§3.5):
/// which side owns the column, and what it's called on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct FkDirection {
    pub holds_fk: bool,
    pub fk_fields: Vec<String>,
    pub pk_fields: Vec<String>,
}

impl From<&RelationInfo> for FkDirection {
    fn from(info: &RelationInfo) -> Self {
        if info.holds_fk {
            FkDirection { holds_fk: true, fk_fields: info.self_fields.clone(), pk_fields: info.target_fields.clone() }
        } else {
            FkDirection { holds_fk: false, fk_fields: info.target_fields.clone(), pk_fields: info.self_fields.clone() }
        }
    }
}
