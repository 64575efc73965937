use super::*;
use crate::config::model::{
    AudioSource, AudioTrackConfig, EmbeddedVideoConfig, TimelineConfig,
};

fn base_cfg() -> CompositionConfig {
    CompositionConfig::new(TimelineConfig {
        fps: 30,
        width: 64,
        height: 36,
        duration_in_frames: 300,
    })
}

fn track(path: &str, duration: u64) -> AudioTrackConfig {
    AudioTrackConfig::new(AudioSource::Path(path.into()), duration)
}

fn clip(id: &str, duration: u64) -> EmbeddedVideoConfig {
    EmbeddedVideoConfig::new(id, format!("{id}.mp4"), duration, 32, 18)
}

#[test]
fn empty_config_has_only_base_filter_and_no_audio() {
    let g = build_filter_graph(&base_cfg()).unwrap();
    assert_eq!(g.graph, "[0:v]fps=30,format=yuv420p[v_out]");
    assert_eq!(g.video_output_label, VIDEO_OUTPUT_LABEL);
    assert!(g.audio_output_label.is_none());
    assert_eq!(g.embedded_video_count, 0);
    assert_eq!(g.chain_count(), 1);
}

#[test]
fn unity_volume_is_elided() {
    let mut cfg = base_cfg();
    cfg.audio_tracks.push(track("a.wav", 300));
    let mut v = clip("v", 90);
    v.audio_volume = 1.0;
    cfg.embedded_videos.push(v);
    let g = build_filter_graph(&cfg).unwrap();
    assert!(!g.graph.contains("volume="));

    cfg.audio_tracks[0].volume = 0.5;
    let g = build_filter_graph(&cfg).unwrap();
    assert_eq!(g.graph.matches("volume=").count(), 1);
    assert!(g.graph.contains("volume=0.5"));
}

#[test]
fn volume_keeps_its_exact_value() {
    let mut cfg = base_cfg();
    cfg.audio_tracks.push(track("a.wav", 300));

    cfg.audio_tracks[0].volume = 1.0000001;
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.contains("[1:a]volume=1.0000001[a_mix_out]"), "{}", g.graph);

    cfg.audio_tracks[0].volume = 0.0000004;
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.contains("[1:a]volume=0.0000004[a_mix_out]"), "{}", g.graph);
}

#[test]
fn single_source_is_renamed_without_mix() {
    let mut cfg = base_cfg();
    cfg.audio_tracks.push(track("a.wav", 300));
    let g = build_filter_graph(&cfg).unwrap();
    assert_eq!(g.audio_output_label.as_deref(), Some(AUDIO_OUTPUT_LABEL));
    assert!(!g.graph.contains("amix"));
    assert!(g.graph.contains("[1:a]anull[a_mix_out]"));
}

#[test]
fn two_sources_get_one_mix_node() {
    let mut cfg = base_cfg();
    cfg.audio_tracks.push(track("a.wav", 300));
    cfg.audio_tracks.push(track("b.wav", 300));
    let g = build_filter_graph(&cfg).unwrap();
    assert_eq!(g.graph.matches("amix=").count(), 1);
    assert!(g.graph.contains("[a0][a1]amix=inputs=2:duration=longest[a_mix_out]"));
}

#[test]
fn input_indices_follow_declaration_order() {
    let mut cfg = base_cfg();
    cfg.embedded_videos.push(clip("v0", 60));
    cfg.embedded_videos.push(clip("v1", 60));
    cfg.audio_tracks.push(track("a.wav", 300));
    cfg.audio_tracks.push(track("b.wav", 300));
    let g = build_filter_graph(&cfg).unwrap();
    let p1 = g.graph.find("[1:a]").unwrap();
    let p2 = g.graph.find("[2:a]").unwrap();
    let p3 = g.graph.find("[3:a]").unwrap();
    let p4 = g.graph.find("[4:a]").unwrap();
    assert!(p1 < p2 && p2 < p3 && p3 < p4);
    assert_eq!(g.embedded_video_count, 2);
}

#[test]
fn silent_sources_keep_their_input_index() {
    let mut cfg = base_cfg();
    let mut muted = clip("v0", 60);
    muted.include_audio = false;
    cfg.embedded_videos.push(muted);
    cfg.embedded_videos.push(clip("empty", 0));
    cfg.audio_tracks.push(track("a.wav", 300));
    let g = build_filter_graph(&cfg).unwrap();
    assert!(!g.graph.contains("[1:a]"));
    assert!(!g.graph.contains("[2:a]"));
    assert!(g.graph.contains("[3:a]anull[a_mix_out]"));
}

#[test]
fn zero_duration_track_contributes_no_audio() {
    let mut cfg = base_cfg();
    cfg.audio_tracks.push(track("a.wav", 0));
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.audio_output_label.is_none());
    assert!(!g.graph.contains(":a]"));
}

#[test]
fn fade_out_starts_at_duration_minus_fade() {
    let mut cfg = base_cfg();
    let mut t = track("a.wav", 300);
    t.fade_out_frames = 30;
    cfg.audio_tracks.push(t);
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.contains("afade=t=out:st=9:d=1"), "{}", g.graph);
}

#[test]
fn embedded_audio_is_delayed_by_start_frame() {
    let mut cfg = base_cfg();
    let mut v = clip("v", 60);
    v.start_frame = 90;
    cfg.embedded_videos.push(v);
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.contains("adelay=3000|3000"), "{}", g.graph);
}

#[test]
fn two_clips_and_a_track_mix_three_inputs() {
    let mut cfg = base_cfg();
    cfg.embedded_videos.push(clip("v0", 60));
    cfg.embedded_videos.push(clip("v1", 60));
    cfg.audio_tracks.push(track("a.wav", 300));
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.contains("amix=inputs=3"));
    for r in ["[1:a]", "[2:a]", "[3:a]"] {
        assert!(g.graph.contains(r), "missing {r}");
    }
}

#[test]
fn stages_follow_fixed_order() {
    let mut cfg = base_cfg();
    let mut t = track("a.wav", 300);
    t.start_frame = 15;
    t.trim_start_frame = 60;
    t.fade_in_frames = 15;
    t.fade_out_frames = 30;
    t.volume = 0.25;
    t.looping = true;
    cfg.audio_tracks.push(t);
    let g = build_filter_graph(&cfg).unwrap();
    assert_eq!(
        g.graph,
        "[0:v]fps=30,format=yuv420p[v_out];\
         [1:a]atrim=start=2,asetpts=PTS-STARTPTS,afade=t=in:st=0:d=0.5,\
         afade=t=out:st=9:d=1,volume=0.25,aloop=loop=-1:size=2147483647,\
         adelay=500|500[a_mix_out]"
    );
}

#[test]
fn build_is_deterministic() {
    let mut cfg = base_cfg();
    cfg.embedded_videos.push(clip("v0", 60));
    cfg.audio_tracks.push(track("a.wav", 300));
    cfg.audio_tracks.push(track("b.wav", 120));
    assert_eq!(
        build_filter_graph(&cfg).unwrap(),
        build_filter_graph(&cfg).unwrap()
    );
}

#[test]
fn zero_fps_is_rejected() {
    let mut cfg = base_cfg();
    cfg.timeline.fps = 0;
    assert!(build_filter_graph(&cfg).is_err());
}

#[test]
fn overlay_mode_chains_clips_onto_base() {
    let mut cfg = base_cfg();
    cfg.embedded_video_mode = EmbeddedVideoMode::Overlay;
    let mut a = clip("v0", 30);
    a.x = 4;
    a.y = 2;
    let mut b = clip("v1", 30);
    b.start_frame = 45;
    b.include_audio = false;
    cfg.embedded_videos.push(a);
    cfg.embedded_videos.push(b);
    let g = build_filter_graph(&cfg).unwrap();
    assert!(g.graph.starts_with("[0:v]fps=30,format=yuv420p[v_base];"));
    assert!(g.graph.contains("[1:v]setpts=PTS-STARTPTS+0/TB,scale=32:18[ev0]"));
    assert!(g.graph.contains("[v_base][ev0]overlay=x=4:y=2:enable='between(t,0,1)'[v_ov0]"));
    assert!(g.graph.contains("[2:v]setpts=PTS-STARTPTS+1.5/TB,scale=32:18[ev1]"));
    assert!(g.graph.contains("[v_ov0][ev1]overlay=x=0:y=0:enable='between(t,1.5,2.5)'[v_out]"));
}

#[test]
fn delay_rounds_half_up_to_whole_ms() {
    assert_eq!(frames_to_delay_ms(90, 30), 3000);
    assert_eq!(frames_to_delay_ms(1, 30), 33);
    assert_eq!(frames_to_delay_ms(2, 30), 67);
    assert_eq!(frames_to_delay_ms(1, 24), 42);
    assert_eq!(frames_to_delay_ms(0, 24), 0);
}

#[test]
fn number_formatting_trims_zeros() {
    assert_eq!(fmt_num(9.0), "9");
    assert_eq!(fmt_num(0.5), "0.5");
    assert_eq!(fmt_num(1.0 / 3.0), "0.333333");
    assert_eq!(fmt_num(0.0), "0");
}
