use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};
use crate::throw;
use crate::vm::class::class::{ClassHandle, LoaderId};
use crate::vm::exception::Exception;

#[derive(Debug)]
struct ConstraintGroup {
    loaders: SmallVec<[LoaderId; 4]>,
    class: Option<ClassHandle>,
}

/// Loading constraints between class loaders, grouped per class name. Every loader in a group must
/// end up with the same class, and a group is bound to that class once any of its loaders loads it.
#[derive(Debug, Default)]
pub struct LoadingConstraints {
    table: Mutex<FxHashMap<String, Vec<ConstraintGroup>>>,
}

impl LoadingConstraints {
    pub fn new() -> LoadingConstraints {
        Default::default()
    }

    /// Records that loaders `a` and `b` must resolve `name` to the same class. `loaded` answers
    /// what a loader currently has loaded under `name`; it runs with the table locked, so a class
    /// cannot appear between the lookup and the new constraint.
    ///
    /// Returns whether the table changed. Registering a constraint that is already implied is a
    /// no-op; a constraint contradicting loaded classes is a `LinkageError`.
    pub fn add_constraint<F>(&self, name: &str, a: LoaderId, b: LoaderId, loaded: F)
        -> Result<bool, Exception>
        where F: Fn(LoaderId) -> Option<ClassHandle> {
        if a == b {
            return Ok(false);
        }

        let mut table = self.table.lock();
        let groups = table.entry(name.to_string()).or_default();

        let group_a = groups.iter().position(|g| g.loaders.contains(&a));
        let group_b = groups.iter().position(|g| g.loaders.contains(&b));

        if group_a.is_some() && group_a == group_b {
            return Ok(false);
        }

        let bound = |group: Option<usize>, loader| {
            group.and_then(|i| groups[i].class.clone()).or_else(|| loaded(loader))
        };
        let bound_a = bound(group_a, a);
        let bound_b = bound(group_b, b);

        if let (Some(x), Some(y)) = (&bound_a, &bound_b) {
            if x != y {
                return Err(throw!(LinkageError,
                    "loading constraint violated: {} and {} disagree on class {}", a, b, name));
            }
        }

        let mut merged = ConstraintGroup { loaders: smallvec![], class: bound_a.or(bound_b) };

        // Remove the higher index first so the lower one stays valid
        let mut absorbed: SmallVec<[usize; 2]> = group_a.into_iter().chain(group_b).collect();
        absorbed.sort_unstable_by(|x, y| y.cmp(x));
        for i in absorbed {
            merged.loaders.extend(groups.swap_remove(i).loaders);
        }
        for loader in [a, b] {
            if !merged.loaders.contains(&loader) {
                merged.loaders.push(loader);
            }
        }

        log::debug!("Loading constraint on {}: {:?}", name, merged.loaders);
        groups.push(merged);

        Ok(true)
    }

    /// Called whenever `loader` becomes an initiating loader of `class`. `publish` makes the class
    /// visible to the loader and runs before the table is unlocked.
    pub fn check_loaded<F>(&self, loader: LoaderId, class: &ClassHandle, publish: F)
        -> Result<(), Exception>
        where F: FnOnce() -> Result<(), Exception> {
        let mut table = self.table.lock();
        let group = table.get_mut(&class.data.name)
            .and_then(|groups| groups.iter_mut().find(|g| g.loaders.contains(&loader)));

        match group {
            None => publish(),
            Some(group) => match &group.class {
                Some(bound) if bound != class => Err(throw!(LinkageError,
                    "loading constraint violated: {} loaded {} (defined by {}) but a constrained \
                    loader uses the one defined by {}", loader, class.data.name,
                    class.data.loader, bound.data.loader)),
                _ => {
                    publish()?;
                    group.class.get_or_insert_with(|| class.clone());
                    Ok(())
                }
            }
        }
    }

    /// Number of constraint groups over all names
    pub fn len(&self) -> usize {
        self.table.lock().values().map(|groups| groups.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loaders that must agree with `loader` on `name`, including `loader` itself.
    pub fn constrained_loaders(&self, name: &str, loader: LoaderId) -> Vec<LoaderId> {
        self.table.lock().get(name)
            .and_then(|groups| groups.iter().find(|g| g.loaders.contains(&loader)))
            .map(|g| g.loaders.to_vec())
            .unwrap_or_else(|| vec![loader])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::vm::class::access::AccessFlagClass;
    use crate::vm::class::class::{ClassHandle, LoaderId};
    use crate::vm::class::definition::ClassDefinition;
    use crate::vm::class_loader::bootstrap::ClassArea;
    use crate::vm::class_loader::constraints::LoadingConstraints;
    use crate::vm::exception::ExceptionKind;

    const NAME: &str = "p/T";

    fn nothing_loaded(_: LoaderId) -> Option<ClassHandle> {
        None
    }

    /// `count` loaders, each defining its own `p/T`, and the class each of them got.
    fn loaders(count: usize) -> (Vec<LoaderId>, Vec<ClassHandle>) {
        let area = ClassArea::new(Arc::new(LoadingConstraints::new())).unwrap();
        let ids: Vec<_> = (0..count).map(|_| area.add_child_first_loader(None)).collect();
        let classes = ids.iter().map(|&loader| {
            area.add_definition(loader, ClassDefinition::new(NAME,
                                                             AccessFlagClass::ACC_PUBLIC as u16));
            area.load_class(loader, NAME).unwrap()
        }).collect();

        (ids, classes)
    }

    #[test]
    fn groups_merge() {
        let (l, _) = loaders(4);
        let constraints = LoadingConstraints::new();

        assert_eq!(constraints.add_constraint(NAME, l[0], l[1], nothing_loaded), Ok(true));
        assert_eq!(constraints.add_constraint(NAME, l[2], l[3], nothing_loaded), Ok(true));
        assert_eq!(constraints.len(), 2);

        assert_eq!(constraints.add_constraint(NAME, l[1], l[2], nothing_loaded), Ok(true));
        assert_eq!(constraints.len(), 1);
        let group = constraints.constrained_loaders(NAME, l[3]);
        assert_eq!(group.len(), 4);
        assert!(l.iter().all(|loader| group.contains(loader)));

        assert_eq!(constraints.add_constraint(NAME, l[0], l[3], nothing_loaded), Ok(false));
        assert_eq!(constraints.add_constraint(NAME, l[0], l[0], nothing_loaded), Ok(false));
        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints.constrained_loaders("p/Other", l[0]), vec![l[0]]);
    }

    #[test]
    fn groups_bound_to_different_classes_conflict() {
        let (l, t) = loaders(4);
        let constraints = LoadingConstraints::new();

        constraints.add_constraint(NAME, l[0], l[1], nothing_loaded).unwrap();
        constraints.check_loaded(l[0], &t[0], || Ok(())).unwrap();
        constraints.add_constraint(NAME, l[2], l[3], nothing_loaded).unwrap();
        constraints.check_loaded(l[2], &t[2], || Ok(())).unwrap();

        let err = constraints.add_constraint(NAME, l[1], l[3], nothing_loaded).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);
        assert_eq!(constraints.len(), 2);

        // classes already loaded by both sides conflict without any group
        let fresh = LoadingConstraints::new();
        let loaded = |loader: LoaderId| l.iter().position(|&id| id == loader).map(|i| t[i].clone());
        let err = fresh.add_constraint(NAME, l[0], l[1], loaded).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);
        assert!(fresh.is_empty());
    }

    #[test]
    fn loading_binds_an_unbound_group() {
        let (l, t) = loaders(3);
        let constraints = LoadingConstraints::new();
        constraints.add_constraint(NAME, l[0], l[1], nothing_loaded).unwrap();

        let mut published = false;
        constraints.check_loaded(l[0], &t[0], || {
            published = true;
            Ok(())
        }).unwrap();
        assert!(published);

        let err = constraints.check_loaded(l[1], &t[1], || unreachable!("published a conflict"))
            .unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);
        constraints.check_loaded(l[1], &t[0], || Ok(())).unwrap();

        // unconstrained loaders are free to load their own class
        constraints.check_loaded(l[2], &t[2], || Ok(())).unwrap();
    }

    #[test]
    fn lookups_and_publication_run_under_the_table_lock() {
        let (l, t) = loaders(2);
        let constraints = LoadingConstraints::new();

        constraints.check_loaded(l[0], &t[0], || {
            assert!(constraints.table.try_lock().is_none());
            Ok(())
        }).unwrap();
        constraints.add_constraint(NAME, l[0], l[1], |loader| {
            assert!(constraints.table.try_lock().is_none());
            (loader == l[0]).then(|| t[0].clone())
        }).unwrap();

        let err = constraints.check_loaded(l[1], &t[1], || Ok(())).unwrap_err();
        assert_eq!(err.kind, ExceptionKind::LinkageError);
    }
}
