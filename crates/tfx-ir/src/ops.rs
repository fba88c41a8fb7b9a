//! Tagged instruction types decoded from 4-byte control words.
//!
//! Every macro instruction, pattern step and trackstep meta-command is a
//! big-endian 32-bit word: one opcode byte followed by three operand bytes.
//! Decoding is infallible; opcodes the replayer does not know become
//! `Unknown` and are ignored at execution time.

/// Split a control word into its four bytes, high byte first.
#[inline]
pub const fn op_bytes(word: u32) -> [u8; 4] {
    word.to_be_bytes()
}

/// The low 16 bits of a control word (operand bytes 2 and 3).
#[inline]
pub const fn op_u16(word: u32) -> u16 {
    word as u16
}

/// Marker value in a trackstep row's first entry that makes the row a
/// meta-command instead of eight (pattern, transpose) pairs.
pub const TRACK_CMD_MARK: u16 = 0xEFFE;

/// One macro (instrument byte-code) instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroOp {
    /// Stop DMA, reset all effect drives. `hold != 0` keeps the voice
    /// running and yields instead.
    DmaOffReset { hold: u8, gemx_mode: u8, gemx_vol: u8 },
    /// Stop DMA without touching effects.
    DmaOff { hold: u8 },
    /// Start DMA (sample playback commits on the next mixer slice).
    DmaOn { efx: u8 },
    /// Set committed and saved sample start address (byte offset).
    SetBegin { addr: u32 },
    /// Set the current sample start without updating the saved copy.
    SetBeginCurrent { addr: u32 },
    /// Start the oscillating add-begin effect and apply one step now.
    AddBegin { ticks: u8, delta: i16 },
    /// Set committed and saved sample length (in 16-bit words).
    SetLen { len: u16 },
    /// Add to the sample length.
    AddLen { delta: i16 },
    /// Yield for `ticks` timer ticks. `really` doubles the first wait.
    Wait { really: bool, ticks: u16 },
    /// Bounded loop back to `step`, `count` iterations (0 = infinite).
    Loop { count: u8, step: u16 },
    /// Like `Loop`, but only while the key is held.
    LoopKeyUp { count: u8, step: u16 },
    /// Jump into another macro.
    Cont { mac: u8, step: u16 },
    /// End of macro.
    Stop,
    /// Branch to `step` when the current note is above `note`.
    NoteSplit { note: u8, step: u16 },
    /// Branch to `step` when the current volume is above `vol`.
    VolSplit { vol: u8, step: u16 },
    /// Pitch by note table relative to the triggering note.
    AddNote { add: u8, detune: u8 },
    /// Pitch by note table, absolute.
    SetNote { note: u8, detune: u8 },
    /// Pitch by note table relative to the previous note.
    AddPrevNote { add: u8, detune: u8 },
    /// Set the period registers directly.
    SetPeriod { period: u16 },
    /// Start a portamento ramp toward the destination period.
    Portamento { reset: u8, rate: i16 },
    /// Start the triangle vibrato oscillator.
    Vibrato { speed: u8, width: i8 },
    /// Start a linear volume envelope.
    Envelope { rate: u8, ticks: u8, target: i8 },
    /// Velocity-scaled volume add.
    AddVolume { mode: u8, vol: u8 },
    /// Absolute volume set.
    SetVolume { mode: u8, vol: u8 },
    /// Zero every active effect drive.
    ResetEffects,
    /// Yield until key release, then loop like `Loop` with `count`.
    WaitKeyUp { count: u8 },
    /// Call a macro, remembering the return address (depth 1).
    GoSub { mac: u8, step: u16 },
    /// Return from `GoSub`.
    ReturnSub,
    /// Shrink the committed sample window in place.
    SampleLoop { offset: u16 },
    /// Point the voice at a one-sample silent window.
    OneShot,
    /// Yield until the mixer has wrapped the sample `cycles` times.
    WaitDmaCycles { cycles: u16 },
    /// Store a value in one of the four cue registers.
    Cue { index: u8, value: u16 },
    /// Re-trigger the current note through the note dispatcher.
    PlayMacro { mac: u8, chan: u8, detune: u8 },
    /// Vendor extension or corrupt byte; executed as a no-op.
    Unknown(u8),
}

impl MacroOp {
    /// Decode one macro instruction word.
    pub fn decode(word: u32) -> Self {
        let [op, b1, b2, b3] = op_bytes(word);
        let w = op_u16(word);
        let addr = word & 0x00FF_FFFF;
        match op {
            0x00 => MacroOp::DmaOffReset { hold: b1, gemx_mode: b2, gemx_vol: b3 },
            0x01 => MacroOp::DmaOn { efx: b1 },
            0x02 => MacroOp::SetBegin { addr },
            0x03 => MacroOp::SetLen { len: w },
            0x04 => MacroOp::Wait { really: b1 & 1 != 0, ticks: w },
            0x05 => MacroOp::Loop { count: b1, step: w },
            0x06 => MacroOp::Cont { mac: b1, step: w },
            0x07 => MacroOp::Stop,
            0x08 => MacroOp::AddNote { add: b1, detune: b3 },
            0x09 => MacroOp::SetNote { note: b1, detune: b3 },
            0x0A => MacroOp::ResetEffects,
            0x0B => MacroOp::Portamento { reset: b1, rate: w as i16 },
            0x0C => MacroOp::Vibrato { speed: b1, width: b3 as i8 },
            0x0D => MacroOp::AddVolume { mode: b2, vol: b3 },
            0x0E => MacroOp::SetVolume { mode: b2, vol: b3 },
            0x0F => MacroOp::Envelope { rate: b1, ticks: b2, target: b3 as i8 },
            0x10 => MacroOp::LoopKeyUp { count: b1, step: w },
            0x11 => MacroOp::AddBegin { ticks: b1, delta: w as i16 },
            0x12 => MacroOp::AddLen { delta: w as i16 },
            0x13 => MacroOp::DmaOff { hold: b1 },
            0x14 => MacroOp::WaitKeyUp { count: b3 },
            0x15 => MacroOp::GoSub { mac: b1, step: w },
            0x16 => MacroOp::ReturnSub,
            0x17 => MacroOp::SetPeriod { period: w },
            0x18 => MacroOp::SampleLoop { offset: w },
            0x19 => MacroOp::OneShot,
            0x1A => MacroOp::WaitDmaCycles { cycles: w },
            0x1C => MacroOp::NoteSplit { note: b1, step: w },
            0x1D => MacroOp::VolSplit { vol: b1, step: w },
            0x1F => MacroOp::AddPrevNote { add: b1, detune: b3 },
            0x20 => MacroOp::Cue { index: b1 & 0x3, value: w },
            0x21 => MacroOp::PlayMacro { mac: b1, chan: b2, detune: b3 },
            0x22 => MacroOp::SetBeginCurrent { addr },
            other => MacroOp::Unknown(other),
        }
    }
}

/// A pattern control step (first byte >= 0xF0). Steps below 0xF0 are note
/// events and are handled byte-wise by the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternOp {
    /// Pattern finished; advance the trackstep position.
    End,
    /// Bounded loop back to `step`, `count` iterations (0 = infinite).
    Loop { count: u8, step: u16 },
    /// Jump into another pattern.
    Cont { pattern: u8, step: u16 },
    /// Suspend this slot for `rows` sequencer steps.
    Wait { rows: u8 },
    /// Stop this slot.
    Stop,
    /// Key-up / vibrato / envelope / lock notes routed to a voice.
    VoiceCmd,
    /// Call a pattern, remembering the return address (depth 1).
    GoSub { pattern: u8, step: u16 },
    /// Return from `GoSub`.
    ReturnSub,
    /// Start a master volume fade.
    Fade { speed: u8, target: u8 },
    /// Retarget one slot at another pattern.
    PlayPattern { pattern: u8, slot: u8, transpose: i8 },
    /// Store a value in one of the four cue registers.
    Cue { index: u8, value: u16 },
    /// Stop this slot and clear the play-pattern flag.
    StopCustom,
    /// No operation.
    Nop,
}

impl PatternOp {
    /// Decode a pattern control word. Returns `None` for note events.
    pub fn decode(word: u32) -> Option<Self> {
        let [op, b1, b2, b3] = op_bytes(word);
        if op < 0xF0 {
            return None;
        }
        let w = op_u16(word);
        Some(match op & 0x0F {
            0x0 => PatternOp::End,
            0x1 => PatternOp::Loop { count: b1, step: w },
            0x2 => PatternOp::Cont { pattern: b1, step: w },
            0x3 => PatternOp::Wait { rows: b1 },
            0x4 => PatternOp::Stop,
            0x5 | 0x6 | 0x7 | 0xC => PatternOp::VoiceCmd,
            0x8 => PatternOp::GoSub { pattern: b1, step: w },
            0x9 => PatternOp::ReturnSub,
            0xA => PatternOp::Fade { speed: b1, target: b3 },
            0xB => PatternOp::PlayPattern {
                pattern: b1,
                slot: b2 & 0x07,
                transpose: b3 as i8,
            },
            0xD => PatternOp::Cue { index: b1 & 0x3, value: w },
            0xE => PatternOp::StopCustom,
            _ => PatternOp::Nop,
        })
    }
}

/// A note-dispatch word, as sent to a voice by the sequencer or by the
/// `PlayMacro` macro op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoteCmd {
    /// Trigger a macro on a voice.
    Play { note: u8, mac: u8, chan: u8, velocity: u8, detune: u8 },
    /// Slide the voice's period toward a new note.
    Porta { note: u8, chan: u8, reset: u8, rate: u8 },
    /// Release the held key.
    KeyUp { chan: u8 },
    /// Start vibrato without re-triggering.
    Vibrato { chan: u8, speed: u8, width: i8 },
    /// Start an envelope without re-triggering.
    Envelope { chan: u8, rate: u8, ticks: u8, target: i8 },
    /// Lock the voice for sound effects for `time` ticks.
    Lock { chan: u8, flag: u8, time: u8 },
    /// Unrecognized pseudo-note; ignored.
    Ignore,
}

impl NoteCmd {
    /// Decode a note-dispatch word.
    pub fn decode(word: u32) -> Self {
        let [note, b1, b2, b3] = op_bytes(word);
        let chan = b2 & 0x0F;
        match note {
            0x00..=0xBF => NoteCmd::Play {
                note,
                mac: b1,
                chan,
                velocity: (b2 >> 4) & 0x0F,
                detune: b3,
            },
            0xC0..=0xEF => NoteCmd::Porta { note: note & 0x3F, chan, reset: b1, rate: b3 },
            0xF5 => NoteCmd::KeyUp { chan },
            0xF6 => NoteCmd::Vibrato {
                chan,
                speed: (b1 & 0xFE) >> 1,
                width: b3 as i8,
            },
            0xF7 => NoteCmd::Envelope {
                chan,
                rate: b1,
                ticks: (b2 >> 4) + 1,
                target: b3 as i8,
            },
            0xFC => NoteCmd::Lock { chan, flag: b1, time: b3 },
            _ => NoteCmd::Ignore,
        }
    }
}

/// A trackstep meta-command row (first entry == `TRACK_CMD_MARK`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackCmd {
    /// Stop the whole song.
    Stop,
    /// Jump back to `pos`, repeating `count` times (0xFFFF = forever).
    Loop { pos: u16, count: u16 },
    /// Set the trackstep prescale and, when valid, the CIA tempo.
    Speed { prescale: u16, tempo: u16 },
    /// Switch the tick length to the 7-voice timeshare mode.
    Timeshare { value: u16 },
    /// Start a master volume fade.
    Fade { speed: u8, target: u8 },
    /// Unrecognized meta-command; the row is skipped.
    Unknown(u16),
}

impl TrackCmd {
    /// Decode a meta-command row. The caller has already checked entry 0.
    pub fn decode(row: &[u16; 8]) -> Self {
        match row[1] {
            0 => TrackCmd::Stop,
            1 => TrackCmd::Loop { pos: row[2], count: row[3] },
            2 => TrackCmd::Speed { prescale: row[2], tempo: row[3] },
            3 => TrackCmd::Timeshare { value: row[3] },
            4 => TrackCmd::Fade {
                speed: (row[2] & 0xFF) as u8,
                target: (row[3] & 0xFF) as u8,
            },
            other => TrackCmd::Unknown(other),
        }
    }
}
