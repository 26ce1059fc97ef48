//! Randomized churn: repeatedly sew and unsew boundary edges of a soup
//! of faces and check that the permutation and embedding invariants
//! survive every step.

use ncmap::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn random_sew_unsew_churn_keeps_invariants() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut map = CMap2::new();
    map.add_attribute::<VertexTag, f32>("x").unwrap();
    map.add_attribute::<EdgeTag, u32>("id").unwrap();

    let mut darts: Vec<Dart> = Vec::new();
    for _ in 0..8 {
        let f = map.add_face(rng.gen_range(3..6));
        let mut d = f.dart();
        loop {
            darts.push(d);
            d = map.phi1(d);
            if d == f.dart() {
                break;
            }
        }
    }

    let mut sewn: Vec<Dart> = Vec::new();
    for step in 0..200 {
        let do_sew = sewn.is_empty() || rng.gen_bool(0.6);
        if do_sew {
            let free: Vec<Dart> = darts
                .iter()
                .copied()
                .filter(|&d| map.is_phi2_free(d))
                .collect();
            if free.len() < 2 {
                continue;
            }
            let a = free[rng.gen_range(0..free.len())];
            let mut b = free[rng.gen_range(0..free.len())];
            while b == a {
                b = free[rng.gen_range(0..free.len())];
            }
            map.sew_faces(a, b);
            sewn.push(a);
        } else {
            let k = rng.gen_range(0..sewn.len());
            let d = sewn.swap_remove(k);
            map.unsew_faces(d);
        }
        map.validate_topology()
            .unwrap_or_else(|e| panic!("step {step}: {e}"));
    }

    // cell counts agree between marker counting and embedded counting
    let by_marker = {
        let mut n = 0;
        map.foreach_cell::<VertexTag, _>(|_| n += 1);
        n
    };
    assert_eq!(by_marker, map.nb_cells::<VertexTag>());

    map.compact();
    map.validate_topology().unwrap();
}

#[test]
fn churn_then_save_load_preserves_everything() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut map = CMap2::new();
    let h = map.add_attribute::<VertexTag, u32>("id").unwrap();
    let faces: Vec<Dart> = (0..5).map(|_| map.add_face(4).dart()).collect();
    for w in faces.windows(2) {
        map.sew_faces(map.phi1(w[0]), w[1]);
    }
    let mut k = 0;
    map.attribute_mut(&h).unwrap().for_each_mut(|_, v| {
        *v = k;
        k += rng.gen_range(1..10);
    });

    let mut buf = Vec::new();
    map.save(&mut buf).unwrap();
    let mut back = CMap2::new();
    back.load(&mut buf.as_slice()).unwrap();

    assert_eq!(back.nb_darts(), map.nb_darts());
    assert_eq!(back.nb_cells::<VertexTag>(), map.nb_cells::<VertexTag>());
    let h2 = back.get_attribute::<VertexTag, u32>("id").unwrap();
    let va = map.attribute(&h).unwrap();
    let vb = back.attribute(&h2).unwrap();
    map.foreach_dart(|d| {
        assert_eq!(va[Vertex::new(d)], vb[Vertex::new(d)]);
    });
    back.validate_topology().unwrap();
}
