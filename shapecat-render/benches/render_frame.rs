use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use shapecat_core::{Shape, TaskPhase, TrialState};
use shapecat_render::{PhaseRenderer as _, ScreenView, SkiaRenderer};
use shapecat_timing::HighPrecisionTimer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn harness() -> (SkiaRenderer, Vec<u8>, HighPrecisionTimer) {
    let r = SkiaRenderer::new(WIDTH, HEIGHT).expect("renderer");
    let fb = vec![0u8; (WIDTH * HEIGHT * 4) as usize];
    (r, fb, HighPrecisionTimer::new())
}

fn view(state: TrialState) -> ScreenView {
    ScreenView {
        phase: TaskPhase::Testing,
        trial_state: Some(state),
        stimulus: Some(Shape::Circle),
        feedback: Some(true),
        volume: 0.5,
    }
}

pub fn bench_frames(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40);

    g.bench_function("response_frame", |b| {
        b.iter_batched(
            harness,
            |(mut r, mut fb, mut t)| {
                let stats = r.render_frame(&view(TrialState::Response), &mut fb, &mut t);
                black_box(stats.ok());
            },
            BatchSize::SmallInput,
        )
    });

    // Steady state: the stimulus stays up, only its own rect is redrawn
    g.bench_function("trial_sequence", |b| {
        let (mut r, mut fb, mut t) = harness();
        let states = [
            TrialState::Fixation,
            TrialState::Response,
            TrialState::Feedback,
            TrialState::Complete,
        ];
        let mut i = 0usize;
        b.iter(|| {
            let stats = r.render_frame(&view(states[i % states.len()]), &mut fb, &mut t);
            i += 1;
            black_box(stats.ok());
        })
    });

    g.bench_function("volume_screen", |b| {
        let (mut r, mut fb, mut t) = harness();
        let mut screen = ScreenView::screen(TaskPhase::VolumeAdjust);
        b.iter(|| {
            screen.volume = (screen.volume + 0.05) % 1.0;
            black_box(r.render_frame(&screen, &mut fb, &mut t).ok());
        })
    });

    g.bench_function("consent_phase_only", |b| {
        b.iter_batched(
            harness,
            |(mut r, _, _)| {
                r.render_phase(black_box(&ScreenView::screen(TaskPhase::Consent)))
                    .ok();
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
