use serde::{Deserialize, Serialize};

/// Relational operator for a conditional increment's guard (spec §4.E,
/// `incrementT(key, delta, cond?)`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl RelOp {
    pub fn holds<T: PartialOrd>(&self, current: T, operand: T) -> bool {
        match self {
            RelOp::Lt => current < operand,
            RelOp::Le => current <= operand,
            RelOp::Gt => current > operand,
            RelOp::Ge => current >= operand,
            RelOp::Eq => current == operand,
            RelOp::Ne => current != operand,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lt_holds() {
        assert!(RelOp::Lt.holds(1u8, 10u8));
        assert!(!RelOp::Lt.holds(10u8, 10u8));
    }
}
