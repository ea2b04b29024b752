//! Integration tests for the genetic engine.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use archipelago::{
    AdaptionOp, CancelToken, Chromosome, Direction, Dna, EntitySelector, Evolution, EvolveError,
    Gene, Genesis, MutateOp, PairSelector, Population, PopulationSettings, Species,
};

/// Fitness is the value of a single int gene; `create_dna` hands out
/// increasing values so tests can pin exact fitness layouts.
struct CounterSpecies {
    next: AtomicI32,
}

impl CounterSpecies {
    fn starting_at(first: i32) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }
}

impl Species for CounterSpecies {
    type Phenotype = ();

    fn create_dna(&self) -> Result<Dna, EvolveError> {
        let mut dna = Dna::new();
        let mut c = Chromosome::int(1, 0, 1_000)?;
        c.set(0, Gene::Int(self.next.fetch_add(1, Ordering::Relaxed)))?;
        dna.add("value", c)?;
        Ok(dna)
    }

    fn express(&self, _dna: &Dna) -> Result<(), EvolveError> {
        Ok(())
    }

    fn evaluate(&self, _phenotype: &(), dna: &Dna) -> Result<f64, EvolveError> {
        let c = dna.get("value").ok_or(EvolveError::Disposed)?;
        match c.gene(0)? {
            Gene::Int(v) => Ok(f64::from(v)),
            other => Err(EvolveError::ShapeMismatch(format!("{other:?}"))),
        }
    }
}

/// Sum of an 8-gene int chromosome in `[1, 9]`, so fitness is always
/// positive (roulette needs positive mass).
struct SumSpecies;

impl Species for SumSpecies {
    type Phenotype = ();

    fn create_dna(&self) -> Result<Dna, EvolveError> {
        let mut dna = Dna::new();
        dna.add("genes", Chromosome::int(8, 1, 9)?)?;
        Ok(dna)
    }

    fn express(&self, _dna: &Dna) -> Result<(), EvolveError> {
        Ok(())
    }

    fn evaluate(&self, _phenotype: &(), dna: &Dna) -> Result<f64, EvolveError> {
        let c = dna.get("genes").ok_or(EvolveError::Disposed)?;
        let mut total = 0.0;
        for i in 0..c.len() {
            if let Gene::Int(v) = c.gene(i)? {
                total += f64::from(v);
            }
        }
        Ok(total)
    }
}

fn dna_sum(dna: &Dna) -> f64 {
    let c = dna.get("genes").unwrap();
    (0..c.len())
        .map(|i| match c.gene(i).unwrap() {
            Gene::Int(v) => f64::from(v),
            other => panic!("unexpected gene {other:?}"),
        })
        .sum()
}

#[test]
fn range_wrapping_drift() {
    // IntChromosome(length 1, min -1, max 1), gene 1: drift Up wraps to
    // -1; from -1, drift Down wraps back to 1.
    let mut c = Chromosome::int(1, -1, 1).unwrap();
    c.set(0, Gene::Int(1)).unwrap();
    c.mutate_drift(0, Direction::Up).unwrap();
    assert_eq!(c.gene(0).unwrap(), Gene::Int(-1));
    c.mutate_drift(0, Direction::Down).unwrap();
    assert_eq!(c.gene(0).unwrap(), Gene::Int(1));
}

#[test]
fn survival_trims_to_stable_size_and_pools_excess() {
    // Eight entities with fitnesses 1..=8, stable size 5, no crossover or
    // mutation: survivors are [8,7,6,5,4] and three entities hit the pool.
    let species = Arc::new(CounterSpecies::starting_at(1));
    let mut population = Population::new(
        species,
        PopulationSettings {
            stable_size: 8,
            genesis: Genesis::User,
            crossover_ratio: 0.0,
            mutation_ratio: 0.0,
            rng_seed: Some(1),
            ..Default::default()
        },
    )
    .unwrap();

    population
        .set_settings(PopulationSettings {
            stable_size: 5,
            genesis: Genesis::User,
            crossover_ratio: 0.0,
            mutation_ratio: 0.0,
            rng_seed: Some(1),
            ..Default::default()
        })
        .unwrap();

    population.step(&CancelToken::new()).unwrap();

    let fitnesses: Vec<f64> = population
        .entities()
        .map(|e| e.fitness().unwrap())
        .collect();
    assert_eq!(fitnesses, vec![8.0, 7.0, 6.0, 5.0, 4.0]);
    assert_eq!(population.free_pool_len(), 3);
}

#[test]
fn every_selector_strategy_sustains_evolution() {
    let strategies: Vec<(PairSelector, EntitySelector)> = vec![
        (PairSelector::random(), EntitySelector::random()),
        (PairSelector::every(), EntitySelector::every()),
        (PairSelector::random_rank(), EntitySelector::random_rank()),
        (PairSelector::best_of_two(), EntitySelector::best_of_two()),
        (PairSelector::roulette(), EntitySelector::roulette()),
    ];

    for (seed, (select_two, select_one)) in strategies.into_iter().enumerate() {
        let settings = PopulationSettings {
            stable_size: 16,
            max_generations: 8,
            select_two,
            select_one,
            rng_seed: Some(seed as u64 + 100),
            ..Default::default()
        };
        let mut population = Population::new(Arc::new(SumSpecies), settings).unwrap();
        population.evolve(&CancelToken::new()).unwrap();

        assert_eq!(population.len(), 16);
        assert_eq!(population.generation(), 8);
        let fitnesses: Vec<f64> = population
            .entities()
            .map(|e| e.fitness().unwrap())
            .collect();
        for pair in fitnesses.windows(2) {
            assert!(pair[0] >= pair[1], "roster unsorted: {fitnesses:?}");
        }
    }
}

#[test]
fn baldwin_adaption_keeps_genotype() {
    // Baldwinian mode: adapted fitness flows back, the genes do not.
    let settings = PopulationSettings {
        stable_size: 8,
        crossover_ratio: 0.0,
        mutation_ratio: 0.0,
        evolution: Evolution::BaldwinAll,
        adaption: Some(AdaptionOp::RandomAscent),
        max_adaption_iterations: 30,
        rng_seed: Some(77),
        ..Default::default()
    };
    let mut population = Population::new(Arc::new(SumSpecies), settings).unwrap();
    population.step(&CancelToken::new()).unwrap();

    let mut improved = 0;
    for entity in population.entities() {
        let raw = dna_sum(entity.dna().unwrap());
        let cached = entity.fitness().unwrap();
        assert!(cached >= raw, "Baldwin score regressed: {cached} < {raw}");
        if cached > raw {
            improved += 1;
        }
    }
    assert!(improved > 0, "adaption never improved any entity");
}

#[test]
fn lamarck_adaption_rewrites_genotype() {
    // Lamarckian mode: the cached score always matches the (improved)
    // genes.
    let settings = PopulationSettings {
        stable_size: 8,
        crossover_ratio: 0.0,
        mutation_ratio: 0.0,
        evolution: Evolution::LamarckAll,
        adaption: Some(AdaptionOp::RandomAscent),
        max_adaption_iterations: 30,
        rng_seed: Some(77),
        ..Default::default()
    };
    let mut population = Population::new(Arc::new(SumSpecies), settings).unwrap();
    population.step(&CancelToken::new()).unwrap();

    for entity in population.entities() {
        let raw = dna_sum(entity.dna().unwrap());
        let cached = entity.fitness().unwrap();
        assert!(
            (cached - raw).abs() < 1e-12,
            "Lamarck genotype out of sync: fitness {cached}, genes {raw}"
        );
    }
}

#[test]
fn mutation_only_runs_still_improve() {
    let settings = PopulationSettings {
        stable_size: 12,
        max_generations: 15,
        crossover_ratio: 0.0,
        mutation_ratio: 1.0,
        mutate: Some(MutateOp::MultiRandom),
        rng_seed: Some(5),
        ..Default::default()
    };
    let mut population = Population::new(Arc::new(SumSpecies), settings).unwrap();
    let before = population.best().unwrap().fitness().unwrap();
    population.evolve(&CancelToken::new()).unwrap();
    let after = population.best().unwrap().fitness().unwrap();
    assert!(after >= before);
}

#[test]
fn cancellation_from_another_thread() {
    let settings = PopulationSettings {
        stable_size: 16,
        steady_state: true,
        rng_seed: Some(3),
        ..Default::default()
    };
    let mut population = Population::new(Arc::new(SumSpecies), settings).unwrap();
    let token = CancelToken::new();
    let remote = token.clone();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(20));
        remote.cancel();
    });

    let result = population.evolve(&token);
    canceller.join().unwrap();
    assert!(matches!(result, Err(EvolveError::Cancelled)));
}

#[test]
fn locked_genes_survive_whole_runs() {
    // A species whose first gene is locked at its ceiling; after a full
    // run of crossover and mutation the lock must still hold everywhere.
    struct LockedSpecies;

    impl Species for LockedSpecies {
        type Phenotype = ();

        fn create_dna(&self) -> Result<Dna, EvolveError> {
            let mut c = Chromosome::int(6, 0, 9)?;
            c.set(0, Gene::Int(9))?;
            c.set_lock(0, true)?;
            let mut dna = Dna::new();
            dna.add("genes", c)?;
            Ok(dna)
        }

        fn express(&self, _dna: &Dna) -> Result<(), EvolveError> {
            Ok(())
        }

        fn evaluate(&self, _phenotype: &(), dna: &Dna) -> Result<f64, EvolveError> {
            let c = dna.get("genes").ok_or(EvolveError::Disposed)?;
            let mut total = 0.0;
            for i in 0..c.len() {
                if let Gene::Int(v) = c.gene(i)? {
                    total += f64::from(v);
                }
            }
            Ok(total)
        }
    }

    let settings = PopulationSettings {
        stable_size: 10,
        max_generations: 10,
        crossover_ratio: 1.0,
        mutation_ratio: 1.0,
        mutate: Some(MutateOp::MultiRandom),
        rng_seed: Some(21),
        ..Default::default()
    };
    let mut population = Population::new(Arc::new(LockedSpecies), settings).unwrap();
    population.evolve(&CancelToken::new()).unwrap();

    for entity in population.entities() {
        let c = entity.dna().unwrap().get("genes").unwrap();
        assert_eq!(c.gene(0).unwrap(), Gene::Int(9), "locked gene changed");
        assert!(c.is_locked(0), "lock bit lost in cloning");
    }
}
