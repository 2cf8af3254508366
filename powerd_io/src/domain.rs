//! Domain hierarchy: board ⊃ package ⊃ core ⊃ cpu, plus accelerators, forming
//! a partial order by containment. Every control and signal is defined at
//! exactly one domain.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// A class of hardware entities over which a signal or control is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Board,
    Package,
    Memory,
    Core,
    Cpu,
    BoardAccelerator,
    AcceleratorChip,
}

impl Domain {
    /// Containment order: `self` is nested inside `other` if `self` appears
    /// strictly before `other` in this list (cpu is innermost).
    const NESTING_ORDER: [Domain; 7] = [
        Domain::Cpu,
        Domain::Core,
        Domain::AcceleratorChip,
        Domain::BoardAccelerator,
        Domain::Package,
        Domain::Memory,
        Domain::Board,
    ];

    fn rank(self) -> usize {
        Self::NESTING_ORDER.iter().position(|d| *d == self).expect("exhaustive NESTING_ORDER")
    }
}

/// Enumerates the domain hierarchy for one node: how many instances of each
/// domain exist, and which inner-domain indices fall under which
/// outer-domain instance.
#[derive(Clone, Debug)]
pub struct PlatformTopo {
    counts: HashMap<Domain, usize>,
    nesting: HashMap<(Domain, Domain), Vec<Vec<usize>>>,
}

impl PlatformTopo {
    pub fn new() -> Self {
        PlatformTopo { counts: HashMap::new(), nesting: HashMap::new() }
    }

    /// Declares that `domain` has `count` instances on this node.
    pub fn set_num_domain(&mut self, domain: Domain, count: usize) {
        self.counts.insert(domain, count);
    }

    /// Declares the set of `inner` indices contained by each instance of
    /// `outer`. `mapping[outer_idx]` is the list of contained inner indices.
    pub fn set_nesting(&mut self, inner: Domain, outer: Domain, mapping: Vec<Vec<usize>>) {
        self.nesting.insert((inner, outer), mapping);
    }

    pub fn num_domain(&self, domain: Domain) -> usize {
        self.counts.get(&domain).copied().unwrap_or(0)
    }

    /// Inner-domain indices contained in a specific outer-domain instance.
    pub fn domain_nested(&self, inner: Domain, outer: Domain, outer_idx: usize) -> Result<&[usize]> {
        let table = self.nesting.get(&(inner, outer)).ok_or_else(|| {
            Error::Invalid(format!("no nesting registered for {:?} inside {:?}", inner, outer))
        })?;
        table
            .get(outer_idx)
            .map(|v| v.as_slice())
            .ok_or_else(|| Error::Invalid(format!("outer index {outer_idx} out of range for {:?}", outer)))
    }

    /// True if `inner` is (non-strictly, i.e. also if equal) nested inside
    /// `outer` by the fixed hardware containment order.
    pub fn is_nested(&self, inner: Domain, outer: Domain) -> bool {
        inner.rank() <= outer.rank()
    }

    /// Convenience constructor for a single-package, `cores_per_package`
    /// core, `cpus_per_core` hardware-thread node — the shape used by this
    /// crate's own tests and by the simulated IOGroup providers.
    pub fn uniform(num_package: usize, cores_per_package: usize, cpus_per_core: usize) -> Self {
        let mut topo = PlatformTopo::new();
        let num_core = num_package * cores_per_package;
        let num_cpu = num_core * cpus_per_core;
        topo.set_num_domain(Domain::Board, 1);
        topo.set_num_domain(Domain::Package, num_package);
        topo.set_num_domain(Domain::Core, num_core);
        topo.set_num_domain(Domain::Cpu, num_cpu);

        let mut core_in_package = vec![Vec::new(); num_package];
        for core in 0..num_core {
            core_in_package[core / cores_per_package].push(core);
        }
        topo.set_nesting(Domain::Core, Domain::Package, core_in_package);

        let mut cpu_in_core = vec![Vec::new(); num_core];
        for cpu in 0..num_cpu {
            cpu_in_core[cpu / cpus_per_core].push(cpu);
        }
        topo.set_nesting(Domain::Cpu, Domain::Core, cpu_in_core);

        let mut cpu_in_package = vec![Vec::new(); num_package];
        for cpu in 0..num_cpu {
            let core = cpu / cpus_per_core;
            cpu_in_package[core / cores_per_package].push(cpu);
        }
        topo.set_nesting(Domain::Cpu, Domain::Package, cpu_in_package);

        topo
    }
}

impl Default for PlatformTopo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_topology_nests_correctly() {
        let topo = PlatformTopo::uniform(2, 2, 2);
        assert_eq!(topo.num_domain(Domain::Package), 2);
        assert_eq!(topo.num_domain(Domain::Core), 4);
        assert_eq!(topo.num_domain(Domain::Cpu), 8);
        assert_eq!(topo.domain_nested(Domain::Core, Domain::Package, 0).unwrap(), &[0, 1]);
        assert_eq!(topo.domain_nested(Domain::Cpu, Domain::Package, 1).unwrap(), &[4, 5, 6, 7]);
        assert!(topo.is_nested(Domain::Cpu, Domain::Package));
        assert!(!topo.is_nested(Domain::Board, Domain::Cpu));
    }

    #[test]
    fn out_of_range_outer_index_is_invalid() {
        let topo = PlatformTopo::uniform(1, 1, 1);
        assert!(topo.domain_nested(Domain::Cpu, Domain::Core, 99).is_err());
    }
}
