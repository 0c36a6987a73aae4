//! The single-process group.

use super::{GroupError, ProcessGroup, Role, Tag};

/// A process group of exactly one rank.
///
/// Rank 0 is always the root; barriers and sends are no-ops, and a
/// receive returns immediately with its buffer untouched, mirroring
/// what a one-member message exchange degenerates to.
#[derive(Clone, Debug, Default)]
pub struct SerialGroup {
    role: Role,
}

impl SerialGroup {
    pub fn new() -> Self {
        Self { role: Role::All }
    }
}

impl ProcessGroup for SerialGroup {
    fn id(&self) -> usize {
        0
    }

    fn group_id(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn role(&self) -> Role {
        self.role
    }

    fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    fn duplicate(&self) -> Box<dyn ProcessGroup> {
        Box::new(self.clone())
    }

    fn subgroup(&self, members: &[usize]) -> Result<Box<dyn ProcessGroup>, GroupError> {
        if members != [0] {
            return Err(GroupError::BadSubgroup);
        }
        Ok(Box::new(self.clone()))
    }

    fn sync(&self) {}

    fn send_f64s(&self, dest: usize, _vals: &[f64], _tag: Tag) -> Result<(), GroupError> {
        if dest != 0 {
            return Err(GroupError::BadRank(dest));
        }
        Ok(())
    }

    fn receive_f64s(
        &self,
        _src: Option<usize>,
        _buf: &mut [f64],
        _tag: Tag,
    ) -> Result<usize, GroupError> {
        Ok(0)
    }

    fn send_i32s(&self, dest: usize, _vals: &[i32], _tag: Tag) -> Result<(), GroupError> {
        if dest != 0 {
            return Err(GroupError::BadRank(dest));
        }
        Ok(())
    }

    fn receive_i32s(
        &self,
        _src: Option<usize>,
        _buf: &mut [i32],
        _tag: Tag,
    ) -> Result<usize, GroupError> {
        Ok(0)
    }

    fn send_str(&self, dest: usize, _s: &str, _tag: Tag) -> Result<(), GroupError> {
        if dest != 0 {
            return Err(GroupError::BadRank(dest));
        }
        Ok(())
    }

    fn receive_str(&self, _src: Option<usize>, _tag: Tag) -> Result<(String, usize), GroupError> {
        Ok((String::new(), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_group_is_its_own_root() {
        let g = SerialGroup::new();
        assert_eq!(g.id(), 0);
        assert_eq!(g.size(), 1);
        assert!(g.is_root());
        assert!(g.belongs(0));
        assert!(!g.belongs(1));
    }

    #[test]
    fn transfers_are_noops() {
        let g = SerialGroup::new();
        g.sync();
        g.send_f64s(0, &[1.0, 2.0], Tag::Parcel).unwrap();
        assert!(g.send_f64s(3, &[1.0], Tag::Parcel).is_err());
        let mut buf = [0.0f64; 2];
        assert_eq!(g.receive_f64s(None, &mut buf, Tag::Parcel).unwrap(), 0);
    }

    #[test]
    fn only_the_identity_subgroup_exists() {
        let g = SerialGroup::new();
        assert!(g.subgroup(&[0]).is_ok());
        assert!(g.subgroup(&[0, 1]).is_err());
    }
}
